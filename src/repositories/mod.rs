pub(crate) mod compliance_sessions;
pub(crate) mod enrollments;
pub(crate) mod locks;
pub(crate) mod payments;
pub(crate) mod progress;
pub(crate) mod quiz_attempts;
