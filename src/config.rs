//! Store configuration
//!
//! Options controlling table naming and session behavior. Loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io(_) => "DOC_CONFIG_IO",
            ConfigError::Parse(_) => "DOC_CONFIG_PARSE",
            ConfigError::Invalid(_) => "DOC_CONFIG_INVALID",
        }
    }
}

/// Document store options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Database schema holding document tables (default: "public")
    #[serde(default = "default_schema_name")]
    pub database_schema_name: String,

    /// Prefix prepended to every document alias (default: "mt_doc_")
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Sessions track loaded documents by identity (default: true)
    #[serde(default = "default_use_identity_map")]
    pub use_identity_map: bool,

    /// Create missing document tables when the store is built (default: false)
    #[serde(default)]
    pub auto_create_schema: bool,
}

fn default_schema_name() -> String {
    "public".to_string()
}

fn default_table_prefix() -> String {
    "mt_doc_".to_string()
}

fn default_use_identity_map() -> bool {
    true
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            database_schema_name: default_schema_name(),
            table_prefix: default_table_prefix(),
            use_identity_map: default_use_identity_map(),
            auto_create_schema: false,
        }
    }
}

impl StoreOptions {
    /// Parses and validates options from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: StoreOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Reads, parses and validates options from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Schema name and prefix end up in generated statements unquoted, so
    /// both must be plain identifiers
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_identifier(&self.database_schema_name) {
            return Err(ConfigError::Invalid(format!(
                "database_schema_name '{}' is not a valid identifier",
                self.database_schema_name
            )));
        }
        if !self.table_prefix.is_empty() && !is_identifier(&self.table_prefix) {
            return Err(ConfigError::Invalid(format!(
                "table_prefix '{}' is not a valid identifier",
                self.table_prefix
            )));
        }
        Ok(())
    }
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
