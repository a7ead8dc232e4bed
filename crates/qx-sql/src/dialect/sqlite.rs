//! SQLite

use super::{call, limit_offset, ActionAlias, CastTarget, Paging, SqlDialect, UpsertStyle};
use crate::token::Token;
use qx_core::config::DialectKind;
use sqlparser::dialect::{Dialect, SQLiteDialect};

/// SQLite dialect
pub struct SqliteDialect {
    dialect: SQLiteDialect,
}

impl SqliteDialect {
    /// Create a new SQLite dialect
    pub fn new() -> Self {
        Self {
            dialect: SQLiteDialect {},
        }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn native_booleans(&self) -> bool {
        false
    }

    fn action_alias(&self) -> ActionAlias {
        ActionAlias::Omitted
    }

    fn paging(&self, limit: Option<Token>, offset: Option<Token>, _ordered: bool) -> Paging {
        match (limit, offset) {
            (None, Some(o)) => limit_offset(Some(Token::lit("-1")), Some(o)),
            (limit, offset) => limit_offset(limit, offset),
        }
    }

    fn upsert(&self) -> UpsertStyle {
        UpsertStyle::OnConflict
    }

    fn cast_type(&self, target: CastTarget) -> &'static str {
        match target {
            CastTarget::String => "TEXT",
            CastTarget::Int | CastTarget::Long => "INTEGER",
            CastTarget::Double => "REAL",
        }
    }

    fn substring_function(&self) -> &'static str {
        "SUBSTR"
    }

    fn json_extract(&self, target: Token, path: Token) -> Option<Token> {
        Some(call("JSON_EXTRACT", vec![target, path]))
    }
}
