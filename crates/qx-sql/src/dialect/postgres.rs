//! PostgreSQL

use super::{SqlDialect, UpsertStyle};
use crate::token::Token;
use qx_core::config::{DialectKind, ParamStyle};
use sqlparser::dialect::{Dialect, PostgreSqlDialect};

/// PostgreSQL dialect
pub struct PostgresDialect {
    dialect: PostgreSqlDialect,
}

impl PostgresDialect {
    /// Create a new PostgreSQL dialect
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn name(&self) -> &'static str {
        "postgres"
    }

    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn distinct_on(&self) -> bool {
        true
    }

    fn unnest(&self) -> bool {
        true
    }

    fn upsert(&self) -> UpsertStyle {
        UpsertStyle::OnConflict
    }

    fn json_extract(&self, target: Token, path: Token) -> Option<Token> {
        Some(Token::parens(Token::spaced(vec![target, Token::lit("->>"), path])))
    }

    fn validation_param_style(&self) -> ParamStyle {
        ParamStyle::Numbered
    }
}
