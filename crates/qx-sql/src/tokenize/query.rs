//! SELECT statements

use super::Tokenizer;
use crate::model::{
    leaves, Distinct, FlattenSqlQuery, FromContext, OrderByCriteria, SelectValue, SetOperation,
    SqlQuery, UnaryOperation,
};
use crate::token::Token;
use qx_core::error::{CompileError, CompileResult};
use qx_core::xr::{Expr, JoinKind};

fn join_keyword(kind: JoinKind) -> &'static str {
    match kind {
        JoinKind::Inner => "INNER JOIN",
        JoinKind::Left => "LEFT JOIN",
        JoinKind::Right => "RIGHT JOIN",
        JoinKind::Full => "FULL JOIN",
    }
}

fn null_sort_key(e: Token, nulls_first: bool) -> Token {
    let (when_null, otherwise) = if nulls_first { ("0", "1") } else { ("1", "0") };
    Token::spaced(vec![
        Token::lit("CASE WHEN"),
        e,
        Token::lit(format!("IS NULL THEN {when_null} ELSE {otherwise} END")),
    ])
}

impl Tokenizer<'_, '_> {
    /// Render a relational query
    pub fn tokenize_query(&mut self, q: &SqlQuery) -> CompileResult<Token> {
        match q {
            SqlQuery::Flatten(f) => self.flatten_query(f),
            SqlQuery::SetOperation { a, op, b } => {
                let op = match op {
                    SetOperation::Union => "UNION",
                    SetOperation::UnionAll => "UNION ALL",
                };
                Ok(Token::spaced(vec![
                    self.set_operand(a)?,
                    Token::lit(op),
                    self.set_operand(b)?,
                ]))
            }
            SqlQuery::UnaryOperation { op, query } => {
                let keyword = match op {
                    UnaryOperation::Exists => "EXISTS",
                    UnaryOperation::NotExists => "NOT EXISTS",
                };
                let test = Token::spaced(vec![
                    Token::lit(keyword),
                    Token::parens(self.tokenize_query(query)?),
                ]);
                let value = if self.dialect.native_booleans() {
                    test
                } else {
                    Token::spaced(vec![
                        Token::lit("CASE WHEN"),
                        test,
                        Token::lit("THEN 1 ELSE 0 END"),
                    ])
                };
                let mut parts = vec![Token::lit("SELECT"), value];
                if let Some(from) = self.dialect.empty_from() {
                    parts.push(Token::lit(format!("FROM {from}")));
                }
                Ok(Token::spaced(parts))
            }
        }
    }

    /// Operands carrying their own ORDER BY or paging are parenthesized
    fn set_operand(&mut self, q: &SqlQuery) -> CompileResult<Token> {
        let token = self.tokenize_query(q)?;
        Ok(match q {
            SqlQuery::Flatten(f)
                if !f.order_by.is_empty() || f.limit.is_some() || f.offset.is_some() =>
            {
                Token::parens(token)
            }
            _ => token,
        })
    }

    fn flatten_query(&mut self, q: &FlattenSqlQuery) -> CompileResult<Token> {
        let aliases = q.from_aliases();
        self.shadowing(&aliases, |t| t.flatten_clauses(q))
    }

    fn flatten_clauses(&mut self, q: &FlattenSqlQuery) -> CompileResult<Token> {
        let mut parts = vec![Token::lit("SELECT")];

        match &q.distinct {
            Distinct::None => {}
            Distinct::All => parts.push(Token::lit("DISTINCT")),
            Distinct::On(items) => {
                if !self.dialect.distinct_on() {
                    return Err(CompileError::unsupported(
                        self.dialect.name(),
                        "DISTINCT ON",
                        q,
                    ));
                }
                let items = self.expr_list(items)?;
                parts.push(Token::spaced(vec![
                    Token::lit("DISTINCT ON"),
                    Token::parens(items),
                ]));
            }
        }

        let limit = q.limit.as_ref().map(|e| self.tokenize_expr(e)).transpose()?;
        let offset = q.offset.as_ref().map(|e| self.tokenize_expr(e)).transpose()?;
        let paging = self
            .dialect
            .paging(limit, offset, !q.order_by.is_empty());
        if let Some(top) = paging.top {
            parts.push(top);
        }

        parts.push(self.select_list(&q.select, q)?);

        if q.from.is_empty() {
            if let Some(from) = self.dialect.empty_from() {
                parts.push(Token::lit(format!("FROM {from}")));
            }
        } else {
            parts.push(Token::lit("FROM"));
            parts.push(self.from_list(&q.from)?);
        }

        if let Some(w) = &q.where_ {
            parts.push(Token::lit("WHERE"));
            parts.push(self.tokenize_expr(w)?);
        }

        if let Some(g) = &q.group_by {
            let keys: Vec<Expr> = leaves(g).into_iter().map(|(_, e)| e).collect();
            parts.push(Token::lit("GROUP BY"));
            parts.push(self.expr_list(&keys)?);
        }

        if !q.order_by.is_empty() {
            parts.push(Token::lit("ORDER BY"));
            parts.push(self.order_by(&q.order_by)?);
        } else if paging.order_fallback {
            parts.push(Token::lit("ORDER BY (SELECT NULL)"));
        }

        if let Some(tail) = paging.tail {
            parts.push(tail);
        }
        Ok(Token::spaced(parts))
    }

    pub(super) fn expr_list(&mut self, items: &[Expr]) -> CompileResult<Token> {
        let tokens = items
            .iter()
            .map(|e| self.tokenize_expr(e))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(Token::join(tokens, ", "))
    }

    fn select_list(&mut self, select: &[SelectValue], q: &FlattenSqlQuery) -> CompileResult<Token> {
        if select.is_empty() {
            return Ok(Token::lit("*"));
        }
        let mut items = Vec::with_capacity(select.len());
        for s in select {
            let value = match &s.expr {
                _ if s.concat => {
                    if !self.dialect.unnest() {
                        return Err(CompileError::unsupported(
                            self.dialect.name(),
                            "concatMap",
                            q,
                        ));
                    }
                    let inner = self.tokenize_expr(&s.expr)?;
                    Token::seq(vec![Token::lit("UNNEST"), Token::parens(inner)])
                }
                Expr::Ident(id) if id.is_hidden() => Token::lit("*"),
                Expr::Ident(id) if id.name != "*" && !self.qualifiers.contains_key(&id.name) => {
                    Token::lit(format!("{}.*", self.dialect.escape_ident(&id.name)))
                }
                e => self.tokenize_expr(e)?,
            };
            items.push(match s.alias_name() {
                Some(alias) => Token::spaced(vec![
                    value,
                    Token::lit("AS"),
                    Token::lit(self.dialect.escape_ident(&alias)),
                ]),
                None => value,
            });
        }
        Ok(Token::join(items, ", "))
    }

    fn from_list(&mut self, from: &[FromContext]) -> CompileResult<Token> {
        let mut parts = Vec::with_capacity(from.len() * 2);
        for (i, ctx) in from.iter().enumerate() {
            if i > 0 {
                let sep = if matches!(ctx, FromContext::Join { .. }) { " " } else { ", " };
                parts.push(Token::lit(sep));
            }
            parts.push(self.from_context(ctx)?);
        }
        Ok(Token::seq(parts))
    }

    fn from_context(&mut self, ctx: &FromContext) -> CompileResult<Token> {
        Ok(match ctx {
            FromContext::Table { name, alias } => Token::spaced(vec![
                Token::lit(self.dialect.escape_ident(name)),
                Token::lit(self.dialect.escape_ident(&alias.name)),
            ]),
            FromContext::Subquery { query, alias } => Token::spaced(vec![
                Token::parens(self.tokenize_query(query)?),
                Token::lit(self.dialect.escape_ident(&alias.name)),
            ]),
            FromContext::RawExpression { expr, alias } => Token::spaced(vec![
                Token::parens(self.tokenize_expr(expr)?),
                Token::lit(self.dialect.escape_ident(&alias.name)),
            ]),
            FromContext::Join { kind, context, on } => Token::spaced(vec![
                Token::lit(join_keyword(*kind)),
                self.from_context(context)?,
                Token::lit("ON"),
                self.tokenize_expr(on)?,
            ]),
        })
    }

    fn order_by(&mut self, criteria: &[OrderByCriteria]) -> CompileResult<Token> {
        let mut items = Vec::with_capacity(criteria.len());
        for c in criteria {
            let e = self.tokenize_expr(&c.expr)?;
            let dir = if c.ordering.is_descending() { "DESC" } else { "ASC" };
            match c.ordering.nulls_first() {
                None => items.push(Token::spaced(vec![e, Token::lit(dir)])),
                Some(first) if self.dialect.nulls_ordering() => {
                    let nulls = if first { "NULLS FIRST" } else { "NULLS LAST" };
                    items.push(Token::spaced(vec![e, Token::lit(dir), Token::lit(nulls)]));
                }
                Some(first) => {
                    items.push(Token::spaced(vec![
                        null_sort_key(e.clone(), first),
                        Token::lit("ASC"),
                    ]));
                    items.push(Token::spaced(vec![e, Token::lit(dir)]));
                }
            }
        }
        Ok(Token::join(items, ", "))
    }
}
