mod parsing;
mod settings;
mod types;

pub(crate) use types::{ComplianceSettings, LedgerSettings, QuizSettings, Settings};
