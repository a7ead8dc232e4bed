//! SQL dialect abstraction
//!
//! Each dialect is a set of hooks the tokenizer consults wherever databases
//! disagree on syntax. Defaults follow ANSI SQL; dialects override only what
//! differs.

mod generic;
mod h2;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;
mod sqlserver;

pub use generic::GenericDialect;
pub use h2::H2Dialect;
pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use crate::token::Token;
use qx_core::config::{DialectKind, ParamStyle};
use qx_core::error::{CompileError, CompileResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::Dialect;
use sqlparser::parser::Parser;

/// How strings are concatenated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatStyle {
    /// An infix operator such as `||`
    Operator(&'static str),
    /// `CONCAT(a, b)`
    Function,
}

/// How the target table of UPDATE / DELETE is aliased
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionAlias {
    /// `UPDATE Person AS p`
    As,
    /// `UPDATE Person p`
    Bare,
    /// No alias; columns are referenced unqualified
    Omitted,
}

/// How generated values are read back from a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningStyle {
    /// `... RETURNING col`
    Returning,
    /// `OUTPUT INSERTED.col` before VALUES / WHERE
    Output,
    /// The driver reads generated keys; no SQL clause is emitted
    GeneratedKeys,
}

/// Conflict handling syntax for inserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertStyle {
    /// `ON CONFLICT (cols) DO NOTHING | DO UPDATE SET ...`
    OnConflict,
    /// `INSERT IGNORE` / `ON DUPLICATE KEY UPDATE ...`
    OnDuplicateKey,
    /// No conflict handling available
    Unsupported,
}

/// Scalar types reachable through conversion functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    String,
    Int,
    Long,
    Double,
}

/// Where LIMIT / OFFSET land in a SELECT
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Paging {
    /// Rendered right after `SELECT [DISTINCT]`
    pub top: Option<Token>,
    /// Rendered after ORDER BY
    pub tail: Option<Token>,
    /// The tail needs an ORDER BY even when the query has none
    pub order_fallback: bool,
}

/// Keywords that must be quoted when used as identifiers
pub const ANSI_RESERVED: &[&str] = &[
    "ALL", "AND", "ANY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "CHECK", "COLUMN",
    "CONSTRAINT", "CREATE", "CROSS", "CURRENT", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP",
    "ELSE", "END", "EXCEPT", "EXISTS", "FALSE", "FETCH", "FOR", "FOREIGN", "FROM", "FULL",
    "GRANT", "GROUP", "HAVING", "IN", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "JOIN",
    "KEY", "LEFT", "LIKE", "LIMIT", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER",
    "PRIMARY", "REFERENCES", "RIGHT", "ROWS", "SELECT", "SET", "TABLE", "THEN", "TO", "TRUE",
    "UNION", "UNIQUE", "UPDATE", "USER", "USING", "VALUES", "WHEN", "WHERE", "WITH",
];

/// Trait for SQL dialect implementations
pub trait SqlDialect: Send + Sync {
    /// Which dialect this is
    fn kind(&self) -> DialectKind;

    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Get the underlying sqlparser dialect
    fn parser_dialect(&self) -> &dyn Dialect;

    /// Parse SQL into AST statements
    fn parse(&self, sql: &str) -> CompileResult<Vec<Statement>> {
        Parser::parse_sql(self.parser_dialect(), sql).map_err(|e| {
            let message = e.to_string();
            let (line, column) = parse_location_from_error(&message);
            CompileError::SqlSyntax {
                dialect: self.name().to_string(),
                message,
                line,
                column,
            }
        })
    }

    /// Quote an identifier for this dialect
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Keywords that cannot appear as bare identifiers
    fn reserved_keywords(&self) -> &'static [&'static str] {
        ANSI_RESERVED
    }

    /// Render an identifier, quoting it only when it is reserved or not a
    /// plain word
    fn escape_ident(&self, ident: &str) -> String {
        let plain = ident
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        let reserved = self
            .reserved_keywords()
            .iter()
            .any(|k| k.eq_ignore_ascii_case(ident));
        if plain && !reserved {
            ident.to_string()
        } else {
            self.quote_ident(ident)
        }
    }

    /// String concatenation
    fn concat(&self) -> ConcatStyle {
        ConcatStyle::Operator("||")
    }

    /// Whether the database has a boolean type usable in predicates and
    /// projections alike
    fn native_booleans(&self) -> bool {
        true
    }

    /// Boolean literal in a value position
    fn boolean_literal(&self, value: bool) -> &'static str {
        match (self.native_booleans(), value) {
            (true, true) => "TRUE",
            (true, false) => "FALSE",
            (false, true) => "1",
            (false, false) => "0",
        }
    }

    /// Alias syntax for the target table of UPDATE / DELETE
    fn action_alias(&self) -> ActionAlias {
        ActionAlias::As
    }

    /// Place LIMIT / OFFSET. `ordered` tells whether the query has an ORDER BY.
    fn paging(&self, limit: Option<Token>, offset: Option<Token>, _ordered: bool) -> Paging {
        limit_offset(limit, offset)
    }

    /// Whether `NULLS FIRST` / `NULLS LAST` is understood
    fn nulls_ordering(&self) -> bool {
        true
    }

    /// Whether `DISTINCT ON (...)` is understood
    fn distinct_on(&self) -> bool {
        false
    }

    /// Whether collection columns can be unnested in a projection
    fn unnest(&self) -> bool {
        false
    }

    /// How generated values are returned
    fn returning(&self) -> ReturningStyle {
        ReturningStyle::Returning
    }

    /// Conflict handling syntax
    fn upsert(&self) -> UpsertStyle {
        UpsertStyle::Unsupported
    }

    /// Type name used by `CAST(x AS ...)`
    fn cast_type(&self, target: CastTarget) -> &'static str {
        match target {
            CastTarget::String => "VARCHAR",
            CastTarget::Int => "INTEGER",
            CastTarget::Long => "BIGINT",
            CastTarget::Double => "DOUBLE PRECISION",
        }
    }

    /// Character length function
    fn length_function(&self) -> &'static str {
        "LENGTH"
    }

    /// Substring function
    fn substring_function(&self) -> &'static str {
        "SUBSTRING"
    }

    /// Extract a scalar from a JSON document, if the dialect can
    fn json_extract(&self, target: Token, path: Token) -> Option<Token> {
        Some(call("JSON_VALUE", vec![target, path]))
    }

    /// FROM clause for a SELECT without a source
    fn empty_from(&self) -> Option<&'static str> {
        None
    }

    /// Placeholder style the parser accepts when re-reading output
    fn validation_param_style(&self) -> ParamStyle {
        ParamStyle::Question
    }
}

/// `name(arg, ...)`
pub fn call(name: &str, args: Vec<Token>) -> Token {
    Token::seq(vec![Token::lit(name), Token::parens(Token::join(args, ", "))])
}

/// `LIMIT n OFFSET m`
pub fn limit_offset(limit: Option<Token>, offset: Option<Token>) -> Paging {
    let tail = match (limit, offset) {
        (Some(l), Some(o)) => Some(Token::spaced(vec![
            Token::lit("LIMIT"),
            l,
            Token::lit("OFFSET"),
            o,
        ])),
        (Some(l), None) => Some(Token::spaced(vec![Token::lit("LIMIT"), l])),
        (None, Some(o)) => Some(Token::spaced(vec![Token::lit("OFFSET"), o])),
        (None, None) => None,
    };
    Paging {
        tail,
        ..Paging::default()
    }
}

/// `OFFSET m ROWS FETCH FIRST n ROWS ONLY`
pub fn offset_fetch(limit: Option<Token>, offset: Option<Token>) -> Paging {
    let mut parts = Vec::new();
    if let Some(o) = offset {
        parts.extend([Token::lit("OFFSET"), o, Token::lit("ROWS")]);
    }
    if let Some(l) = limit {
        parts.extend([Token::lit("FETCH FIRST"), l, Token::lit("ROWS ONLY")]);
    }
    Paging {
        tail: (!parts.is_empty()).then(|| Token::spaced(parts)),
        ..Paging::default()
    }
}

/// Build the dialect implementation for a configured kind
pub fn dialect_for(kind: DialectKind) -> Box<dyn SqlDialect> {
    match kind {
        DialectKind::Generic => Box::new(GenericDialect::new()),
        DialectKind::Postgres => Box::new(PostgresDialect::new()),
        DialectKind::MySql => Box::new(MySqlDialect::new()),
        DialectKind::Sqlite => Box::new(SqliteDialect::new()),
        DialectKind::SqlServer => Box::new(SqlServerDialect::new()),
        DialectKind::H2 => Box::new(H2Dialect::new()),
        DialectKind::Oracle => Box::new(OracleDialect::new()),
    }
}

/// Parse line and column from sqlparser error message.
///
/// sqlparser's `ParserError` is a plain string wrapper with no structured
/// location, so "Line: N, Column: M" is read back from the message text.
fn parse_location_from_error(msg: &str) -> (usize, usize) {
    let Some(line_idx) = msg.find("Line: ") else {
        return (0, 0);
    };
    let line_start = line_idx + 6;
    let Some(comma_idx) = msg[line_start..].find(',') else {
        return (0, 0);
    };
    let Ok(line) = msg[line_start..line_start + comma_idx]
        .trim()
        .parse::<usize>()
    else {
        return (0, 0);
    };
    let Some(col_idx) = msg.find("Column: ") else {
        return (0, 0);
    };
    let col_start = col_idx + 8;
    let col_end = msg[col_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| col_start + i)
        .unwrap_or(msg.len());
    let Ok(column) = msg[col_start..col_end].trim().parse::<usize>() else {
        return (0, 0);
    };
    (line, column)
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
