use crate::services::catalog::{AutoEnrollAllowlist, PricingCatalog};

use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_f64,
    parse_i64, parse_string_list, parse_u16, parse_u32, parse_utc_offset,
};
use super::types::{
    AdminSettings, ApiSettings, ComplianceSettings, ConfigError, CorsSettings, DatabaseSettings,
    LedgerSettings, QuizSettings, RuntimeSettings, ServerHost, ServerPort, ServerSettings,
    Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("LEDGER_HOST", "0.0.0.0");
        let port = env_or_default("LEDGER_PORT", "8000");

        let environment =
            parse_environment(env_optional("LEDGER_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("LEDGER_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Enrollment Ledger API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "ledger");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "enrollment_ledger");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "20"),
        )?;

        let catalog = match env_optional("COURSE_CATALOG_JSON") {
            Some(raw) => PricingCatalog::from_json(&raw).map_err(ConfigError::InvalidCatalog)?,
            None => PricingCatalog::builtin(),
        };
        let auto_enroll =
            AutoEnrollAllowlist::new(parse_string_list(env_optional("AUTO_ENROLL_EMAILS"), &[]));

        let max_attempts =
            parse_u32("QUIZ_MAX_ATTEMPTS", env_or_default("QUIZ_MAX_ATTEMPTS", "3"))?;
        let passing_score =
            parse_f64("QUIZ_PASSING_SCORE", env_or_default("QUIZ_PASSING_SCORE", "70"))?;

        let max_daily_seconds = parse_i64(
            "COMPLIANCE_MAX_DAILY_SECONDS",
            env_or_default("COMPLIANCE_MAX_DAILY_SECONDS", "14400"),
        )?;
        let min_break_seconds = parse_i64(
            "COMPLIANCE_MIN_BREAK_SECONDS",
            env_or_default("COMPLIANCE_MIN_BREAK_SECONDS", "600"),
        )?;
        let utc_offset = parse_utc_offset(
            "COMPLIANCE_UTC_OFFSET",
            env_or_default("COMPLIANCE_UTC_OFFSET", "Z"),
        )?;

        let admin_api_key = env_or_default("ADMIN_API_KEY", "");

        let log_level = env_or_default("LEDGER_LOG_LEVEL", "info");
        let json = env_optional("LEDGER_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            ledger: LedgerSettings { catalog, auto_enroll },
            quiz: QuizSettings { max_attempts, passing_score },
            compliance: ComplianceSettings { max_daily_seconds, min_break_seconds, utc_offset },
            admin: AdminSettings { api_key: admin_api_key },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn ledger(&self) -> &LedgerSettings {
        &self.ledger
    }

    pub(crate) fn quiz(&self) -> &QuizSettings {
        &self.quiz
    }

    pub(crate) fn compliance(&self) -> &ComplianceSettings {
        &self.compliance
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        if self.ledger.catalog.len() == 0 {
            return Err(ConfigError::InvalidCatalog("catalog has no courses".to_string()));
        }

        if self.quiz.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "QUIZ_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        if !(0.0..=100.0).contains(&self.quiz.passing_score) {
            return Err(ConfigError::InvalidValue {
                field: "QUIZ_PASSING_SCORE",
                value: self.quiz.passing_score.to_string(),
            });
        }

        if self.compliance.max_daily_seconds <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "COMPLIANCE_MAX_DAILY_SECONDS",
                value: self.compliance.max_daily_seconds.to_string(),
            });
        }

        if self.compliance.min_break_seconds < 0 {
            return Err(ConfigError::InvalidValue {
                field: "COMPLIANCE_MIN_BREAK_SECONDS",
                value: self.compliance.min_break_seconds.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.admin.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("ADMIN_API_KEY"));
        }

        Ok(())
    }
}
