//! H2

use super::{ReturningStyle, SqlDialect};
use crate::token::Token;
use qx_core::config::DialectKind;
use sqlparser::dialect::{Dialect, GenericDialect as SqlParserGeneric};

/// H2 dialect. sqlparser has no H2 grammar; output is checked against the
/// generic one.
pub struct H2Dialect {
    dialect: SqlParserGeneric,
}

impl H2Dialect {
    /// Create a new H2 dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserGeneric {},
        }
    }
}

impl Default for H2Dialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for H2Dialect {
    fn kind(&self) -> DialectKind {
        DialectKind::H2
    }

    fn name(&self) -> &'static str {
        "h2"
    }

    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn returning(&self) -> ReturningStyle {
        ReturningStyle::GeneratedKeys
    }

    fn json_extract(&self, _target: Token, _path: Token) -> Option<Token> {
        None
    }
}
