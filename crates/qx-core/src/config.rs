//! Compiler configuration, loaded from YAML

use crate::error::{ConfigError, ConfigResult};
use crate::trace::TraceType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options controlling a compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    /// Target SQL dialect
    #[serde(default)]
    pub dialect: DialectKind,

    /// Upper bound on normalization fixpoint iterations
    #[serde(default = "default_max_normalize_iterations")]
    pub max_normalize_iterations: usize,

    /// Placeholder style used when building SQL text
    #[serde(default)]
    pub param_style: ParamStyle,

    /// Re-parse generated SQL with the dialect's parser
    #[serde(default)]
    pub validate_output: bool,

    /// Diagnostic trace side channel
    #[serde(default)]
    pub trace: TraceConfig,

    /// Label attached to compiled statements when the caller gives none
    #[serde(default)]
    pub label: Option<String>,
}

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// ANSI SQL
    #[default]
    Generic,
    /// PostgreSQL
    Postgres,
    /// MySQL / MariaDB
    MySql,
    /// SQLite
    Sqlite,
    /// Microsoft SQL Server
    SqlServer,
    /// H2
    H2,
    /// Oracle
    Oracle,
}

impl DialectKind {
    /// Every supported dialect
    pub const ALL: [DialectKind; 7] = [
        DialectKind::Generic,
        DialectKind::Postgres,
        DialectKind::MySql,
        DialectKind::Sqlite,
        DialectKind::SqlServer,
        DialectKind::H2,
        DialectKind::Oracle,
    ];
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialectKind::Generic => write!(f, "generic"),
            DialectKind::Postgres => write!(f, "postgres"),
            DialectKind::MySql => write!(f, "mysql"),
            DialectKind::Sqlite => write!(f, "sqlite"),
            DialectKind::SqlServer => write!(f, "sqlserver"),
            DialectKind::H2 => write!(f, "h2"),
            DialectKind::Oracle => write!(f, "oracle"),
        }
    }
}

/// Placeholder rendering for positional parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamStyle {
    /// `?`
    #[default]
    Question,
    /// `$1`, `$2`, ...
    Numbered,
}

/// Trace side channel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TraceConfig {
    /// Emit trace events at all
    #[serde(default)]
    pub enabled: bool,

    /// Event kinds to emit; empty means every kind
    #[serde(default)]
    pub types: Vec<TraceType>,
}

fn default_max_normalize_iterations() -> usize {
    100
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            max_normalize_iterations: default_max_normalize_iterations(),
            param_style: ParamStyle::default(),
            validate_output: false,
            trace: TraceConfig::default(),
            label: None,
        }
    }
}

impl CompilerConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let config: CompilerConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Same configuration targeting another dialect
    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_normalize_iterations == 0 {
            return Err(ConfigError::Invalid {
                message: "max_normalize_iterations must be at least 1".to_string(),
            });
        }
        if let Some(label) = &self.label {
            if label.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: "label cannot be blank".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
