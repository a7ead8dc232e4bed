//! ANSI SQL

use super::SqlDialect;
use qx_core::config::DialectKind;
use sqlparser::dialect::{Dialect, GenericDialect as SqlParserGeneric};

/// ANSI SQL dialect, every hook at its default
pub struct GenericDialect {
    dialect: SqlParserGeneric,
}

impl GenericDialect {
    /// Create a new generic dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserGeneric {},
        }
    }
}

impl Default for GenericDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for GenericDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Generic
    }

    fn name(&self) -> &'static str {
        "generic"
    }

    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }
}
