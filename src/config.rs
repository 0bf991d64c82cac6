//! Environment-driven configuration.
//!
//! Required: `ARCHIVIST_ARCHIVE_URL`, `ARCHIVIST_ARCHIVE_TOKEN`,
//! `ARCHIVIST_API_KEY`. Everything else has a default. Values are read
//! once at startup into an owned `Settings` that is injected everywhere —
//! no module reads the environment on its own.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::classifier::confidence::ConfidenceWeights;

pub const APP_NAME: &str = "archivist";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default log filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info,warn")
}

/// Get the application data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

/// Central service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    // Archive connection
    pub archive_url: String,
    pub archive_token: String,

    // Reasoning service
    pub reasoning_base_url: String,
    pub reasoning_api_key: String,
    /// Capable (expensive) model for scans, long or first-time documents.
    pub capable_model: String,
    /// Fast (cheap) model for known senders with simple digital documents.
    pub fast_model: String,
    /// Optional override: skip routing and always use this model.
    pub force_model: Option<String>,
    pub max_answer_tokens: u32,

    // Workflow vocabulary in the archive
    /// Tag marking unprocessed documents. Removed by the apply step.
    pub trigger_tag: String,
    /// Select custom field recording the pipeline outcome per document.
    pub status_field: String,
    pub person_field: String,
    pub pagination_field: String,
    pub house_register_field: String,
    pub house_sequence_field: String,

    // Cycle driver
    pub poll_interval_secs: u64,
    pub document_delay_secs: u64,
    pub monthly_budget_usd: f64,

    // Confidence scoring
    pub weights: ConfidenceWeights,

    // HTTP surface
    pub bind_addr: String,

    pub data_dir: PathBuf,
}

impl Settings {
    /// Load settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Load settings from an explicit map (testable without touching the
    /// process environment).
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| vars.get(name).map(|v| v.trim().to_string());
        let require = |name: &'static str| {
            get(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };

        let archive_url = require("ARCHIVIST_ARCHIVE_URL")?;
        let archive_token = require("ARCHIVIST_ARCHIVE_TOKEN")?;
        let reasoning_api_key = require("ARCHIVIST_API_KEY")?;

        Ok(Self {
            archive_url: archive_url.trim_end_matches('/').to_string(),
            archive_token,
            reasoning_base_url: get("ARCHIVIST_REASONING_URL")
                .unwrap_or_else(|| "https://api.anthropic.com".into()),
            reasoning_api_key,
            capable_model: get("ARCHIVIST_CAPABLE_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-5-20250929".into()),
            fast_model: get("ARCHIVIST_FAST_MODEL")
                .unwrap_or_else(|| "claude-haiku-4-5-20251001".into()),
            force_model: get("ARCHIVIST_FORCE_MODEL").filter(|v| !v.is_empty()),
            max_answer_tokens: parse_num(vars, "ARCHIVIST_MAX_ANSWER_TOKENS", 2048)?,
            trigger_tag: get("ARCHIVIST_TRIGGER_TAG").unwrap_or_else(|| "Inbox".into()),
            status_field: get("ARCHIVIST_STATUS_FIELD").unwrap_or_else(|| "ai_status".into()),
            person_field: get("ARCHIVIST_PERSON_FIELD").unwrap_or_else(|| "Person".into()),
            pagination_field: get("ARCHIVIST_PAGINATION_FIELD")
                .unwrap_or_else(|| "Pagination".into()),
            house_register_field: get("ARCHIVIST_HOUSE_REGISTER_FIELD")
                .unwrap_or_else(|| "House Register".into()),
            house_sequence_field: get("ARCHIVIST_HOUSE_SEQUENCE_FIELD")
                .unwrap_or_else(|| "House Sequence".into()),
            poll_interval_secs: parse_num(vars, "ARCHIVIST_POLL_INTERVAL_SECS", 300)?,
            document_delay_secs: parse_num(vars, "ARCHIVIST_DOCUMENT_DELAY_SECS", 2)?,
            monthly_budget_usd: parse_num(vars, "ARCHIVIST_MONTHLY_BUDGET_USD", 25.0)?,
            weights: ConfidenceWeights {
                self_report: parse_num(vars, "ARCHIVIST_WEIGHT_SELF_REPORT", 0.40)?,
                mapping: parse_num(vars, "ARCHIVIST_WEIGHT_MAPPING", 0.30)?,
                fuzzy: parse_num(vars, "ARCHIVIST_WEIGHT_FUZZY", 0.15)?,
                special: parse_num(vars, "ARCHIVIST_WEIGHT_SPECIAL", 0.15)?,
            },
            bind_addr: get("ARCHIVIST_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8087".into()),
            data_dir: get("ARCHIVIST_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
        })
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("archivist.db")
    }
}

fn parse_num<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            name,
            reason: e.to_string(),
        }),
    }
}
