pub(crate) mod access_gate;
pub(crate) mod catalog;
pub(crate) mod compliance_tracker;
pub(crate) mod enrollment_ledger;
pub(crate) mod errors;
pub(crate) mod payment_engine;
pub(crate) mod quiz_governor;
