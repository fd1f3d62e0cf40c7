pub mod api;
pub mod assets;
pub mod error;
pub mod hub;
pub mod provision;
pub mod recovery;
pub mod store;
pub mod token;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle of a canvas session, stored as its string name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Created,
    Configured,
    Active,
    Completed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "Created",
            SessionStatus::Configured => "Configured",
            SessionStatus::Active => "Active",
            SessionStatus::Completed => "Completed",
            SessionStatus::Expired => "Expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Created" => Some(SessionStatus::Created),
            "Configured" => Some(SessionStatus::Configured),
            "Active" => Some(SessionStatus::Active),
            "Completed" => Some(SessionStatus::Completed),
            "Expired" => Some(SessionStatus::Expired),
            _ => None,
        }
    }

    /// Whether participants may still post questions and annotations.
    pub fn accepts_activity(&self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Configured)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminator of the `session_data` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionDataType {
    SharedAsset,
    Annotation,
    Question,
    QuestionAnswer,
    QuestionVote,
}

impl SessionDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionDataType::SharedAsset => "SharedAsset",
            SessionDataType::Annotation => "Annotation",
            SessionDataType::Question => "Question",
            SessionDataType::QuestionAnswer => "QuestionAnswer",
            SessionDataType::QuestionVote => "QuestionVote",
        }
    }
}

impl fmt::Display for SessionDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custom error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Could not generate a unique token after {0} attempts")]
    TokenExhausted(usize),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Recovery failed after {attempts} attempts: {message}")]
    RecoveryFailed { attempts: u32, message: String },
}

/// Utility functions
pub mod utils {
    use uuid::Uuid;

    /// Short correlation id returned in API responses and written to logs.
    pub fn generate_request_id() -> String {
        Uuid::new_v4().simple().to_string()[..8].to_string()
    }
}

pub mod logger {
    use slog::{Drain, Logger, o};

    /// Terminal logger for the command-line tools, writing to stderr so stdout
    /// stays free for their output. `RUST_LOG` filters it.
    pub fn component_logger(component: &'static str) -> Logger {
        let decorator = slog_term::TermDecorator::new().stderr().build();
        let drain = slog_term::CompactFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        let drain = slog_envlogger::new(drain).fuse();

        Logger::root(
            drain,
            o!("component" => component, "version" => env!("CARGO_PKG_VERSION")),
        )
    }
}

pub mod config {
    use config::{Config, ConfigError, Environment};
    use dotenv::dotenv;
    use serde::Deserialize;

    #[derive(Debug, Clone, Deserialize)]
    pub struct ServiceConfig {
        pub database_url: String,
        pub bind_address: String,
        /// Key for the HMAC over host GUIDs.
        pub host_secret: String,
        pub token_ttl_hours: i64,
        pub public_base_url: String,
        pub environment: String,
        pub db_connect_attempts: u32,
        pub expiry_sweep_secs: u64,
        /// HMAC of the admin GUID. Admin routes refuse everyone while unset.
        #[serde(default)]
        pub admin_guid_hash: Option<String>,
    }

    impl ServiceConfig {
        pub fn new() -> Result<Self, ConfigError> {
            // Load environment variables from .env file
            dotenv().ok();

            let mut s = Config::new();

            // Add in settings from the environment (with a prefix of APP)
            // Eg.. `APP_DATABASE_URL=postgres://... would set the `database_url` key
            s.merge(Environment::with_prefix("APP"))?;

            Self::from_config(s)
        }

        /// Applies defaults underneath whatever `s` already carries, then deserializes.
        pub fn from_config(mut s: Config) -> Result<Self, ConfigError> {
            s.set_default("bind_address", "0.0.0.0:9090")?;
            s.set_default("token_ttl_hours", 24i64)?;
            s.set_default("public_base_url", "https://localhost:9091")?;
            s.set_default("environment", "Development")?;
            s.set_default("db_connect_attempts", 5i64)?;
            s.set_default("expiry_sweep_secs", 300i64)?;

            s.try_into()
        }

        pub fn is_development(&self) -> bool {
            self.environment.eq_ignore_ascii_case("development")
        }

        pub fn base_url(&self) -> &str {
            self.public_base_url.trim_end_matches('/')
        }
    }
}
