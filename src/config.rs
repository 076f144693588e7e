use std::path::PathBuf;

use serde::Deserialize;

/// How a multi-tier cascade is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Every row of a cascade in one batch.
    Atomic,
    /// One batch per tier; failures report the tiers already written.
    PerTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub db_path: PathBuf,
    pub temporary: bool,
    pub rejection_ttl_days: i64,
    pub commit_mode: CommitMode,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("loan-channel.db"),
            temporary: false,
            rejection_ttl_days: 90,
            commit_mode: CommitMode::Atomic,
            log_level: "info".into(),
            log_format: LogFormat::Compact,
        }
    }
}

impl LedgerConfig {
    /// Defaults overlaid with `LOAN_CHANNEL__*` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .set_default("db_path", "loan-channel.db")?
            .set_default("temporary", false)?
            .set_default("rejection_ttl_days", 90)?
            .set_default("commit_mode", "atomic")?
            .set_default("log_level", "info")?
            .set_default("log_format", "compact")?
            .add_source(
                config::Environment::with_prefix("LOAN_CHANNEL")
                    .prefix_separator("__")
                    .try_parsing(true),
            )
            .build()?;
        cfg.try_deserialize()
    }

    /// A throwaway database, removed when the store is dropped.
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Self::default()
        }
    }
}
