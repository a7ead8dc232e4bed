//! Oracle

use super::{offset_fetch, ActionAlias, CastTarget, Paging, ReturningStyle, SqlDialect};
use crate::token::Token;
use qx_core::config::DialectKind;
use sqlparser::dialect::{Dialect, GenericDialect as SqlParserGeneric};

/// Oracle dialect. sqlparser has no Oracle grammar; output is checked
/// against the generic one.
pub struct OracleDialect {
    dialect: SqlParserGeneric,
}

impl OracleDialect {
    /// Create a new Oracle dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserGeneric {},
        }
    }
}

impl Default for OracleDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for OracleDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn name(&self) -> &'static str {
        "oracle"
    }

    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn native_booleans(&self) -> bool {
        false
    }

    fn action_alias(&self) -> ActionAlias {
        ActionAlias::Bare
    }

    fn paging(&self, limit: Option<Token>, offset: Option<Token>, _ordered: bool) -> Paging {
        offset_fetch(limit, offset)
    }

    fn returning(&self) -> ReturningStyle {
        ReturningStyle::GeneratedKeys
    }

    fn cast_type(&self, target: CastTarget) -> &'static str {
        match target {
            CastTarget::String => "VARCHAR2(4000)",
            CastTarget::Int => "NUMBER(10)",
            CastTarget::Long => "NUMBER(19)",
            CastTarget::Double => "BINARY_DOUBLE",
        }
    }

    fn substring_function(&self) -> &'static str {
        "SUBSTR"
    }

    fn empty_from(&self) -> Option<&'static str> {
        Some("DUAL")
    }
}
