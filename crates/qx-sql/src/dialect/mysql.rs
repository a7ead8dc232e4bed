//! MySQL / MariaDB

use super::{
    call, limit_offset, ActionAlias, CastTarget, ConcatStyle, Paging, ReturningStyle, SqlDialect,
    UpsertStyle,
};
use crate::token::Token;
use qx_core::config::DialectKind;
use sqlparser::dialect::{Dialect, MySqlDialect as SqlParserMySql};

/// Largest row count MySQL accepts, used when only an offset is given
const MAX_ROWS: &str = "18446744073709551615";

/// MySQL dialect
pub struct MySqlDialect {
    dialect: SqlParserMySql,
}

impl MySqlDialect {
    /// Create a new MySQL dialect
    pub fn new() -> Self {
        Self {
            dialect: SqlParserMySql {},
        }
    }
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn name(&self) -> &'static str {
        "mysql"
    }

    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn concat(&self) -> ConcatStyle {
        ConcatStyle::Function
    }

    fn action_alias(&self) -> ActionAlias {
        ActionAlias::Bare
    }

    fn paging(&self, limit: Option<Token>, offset: Option<Token>, _ordered: bool) -> Paging {
        match (limit, offset) {
            (None, Some(o)) => limit_offset(Some(Token::lit(MAX_ROWS)), Some(o)),
            (limit, offset) => limit_offset(limit, offset),
        }
    }

    fn nulls_ordering(&self) -> bool {
        false
    }

    fn returning(&self) -> ReturningStyle {
        ReturningStyle::GeneratedKeys
    }

    fn upsert(&self) -> UpsertStyle {
        UpsertStyle::OnDuplicateKey
    }

    fn cast_type(&self, target: CastTarget) -> &'static str {
        match target {
            CastTarget::String => "CHAR",
            CastTarget::Int | CastTarget::Long => "SIGNED",
            CastTarget::Double => "DOUBLE",
        }
    }

    fn length_function(&self) -> &'static str {
        "CHAR_LENGTH"
    }

    fn json_extract(&self, target: Token, path: Token) -> Option<Token> {
        Some(call("JSON_UNQUOTE", vec![call("JSON_EXTRACT", vec![target, path])]))
    }
}
