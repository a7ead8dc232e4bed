//! Microsoft SQL Server

use super::{
    call, offset_fetch, ActionAlias, CastTarget, ConcatStyle, Paging, ReturningStyle, SqlDialect,
};
use crate::token::Token;
use qx_core::config::DialectKind;
use sqlparser::dialect::{Dialect, MsSqlDialect};

/// SQL Server dialect
pub struct SqlServerDialect {
    dialect: MsSqlDialect,
}

impl SqlServerDialect {
    /// Create a new SQL Server dialect
    pub fn new() -> Self {
        Self {
            dialect: MsSqlDialect {},
        }
    }
}

impl Default for SqlServerDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for SqlServerDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn concat(&self) -> ConcatStyle {
        ConcatStyle::Operator("+")
    }

    fn native_booleans(&self) -> bool {
        false
    }

    fn action_alias(&self) -> ActionAlias {
        ActionAlias::Omitted
    }

    /// `TOP (n)` alone, `OFFSET ... FETCH` as soon as an offset is involved
    fn paging(&self, limit: Option<Token>, offset: Option<Token>, ordered: bool) -> Paging {
        match (limit, offset) {
            (Some(l), None) => Paging {
                top: Some(Token::spaced(vec![Token::lit("TOP"), Token::parens(l)])),
                ..Paging::default()
            },
            (limit, Some(o)) => Paging {
                order_fallback: !ordered,
                ..offset_fetch(limit, Some(o))
            },
            (None, None) => Paging::default(),
        }
    }

    fn nulls_ordering(&self) -> bool {
        false
    }

    fn returning(&self) -> ReturningStyle {
        ReturningStyle::Output
    }

    fn cast_type(&self, target: CastTarget) -> &'static str {
        match target {
            CastTarget::String => "VARCHAR(MAX)",
            CastTarget::Int => "INT",
            CastTarget::Long => "BIGINT",
            CastTarget::Double => "FLOAT",
        }
    }

    fn length_function(&self) -> &'static str {
        "LEN"
    }

    fn json_extract(&self, target: Token, path: Token) -> Option<Token> {
        Some(call("JSON_VALUE", vec![target, path]))
    }
}
