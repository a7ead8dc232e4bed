//! Scalar expressions

use super::{Qualifier, Tokenizer};
use crate::dialect::ConcatStyle;
use crate::token::Token;
use qx_core::error::{CompileError, CompileResult};
use qx_core::xr::{BinaryOperator, Constant, Expr, ParamKind, UnaryOperator, Visibility};

pub(super) const ATOM: u8 = 10;

/// Binding strength; higher binds tighter
fn precedence(e: &Expr) -> u8 {
    match e {
        Expr::BinaryOp { op, .. } => match op {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
            | BinaryOperator::In => 4,
            BinaryOperator::Plus | BinaryOperator::Minus | BinaryOperator::Concat => 5,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 6,
        },
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            ..
        } => 3,
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            ..
        } => 7,
        _ => ATOM,
    }
}

fn operator_sql(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Eq => "=",
        BinaryOperator::NotEq => "<>",
        BinaryOperator::Lt => "<",
        BinaryOperator::LtEq => "<=",
        BinaryOperator::Gt => ">",
        BinaryOperator::GtEq => ">=",
        BinaryOperator::And => "AND",
        BinaryOperator::Or => "OR",
        BinaryOperator::Plus => "+",
        BinaryOperator::Minus => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Modulo => "%",
        BinaryOperator::Concat => "||",
        BinaryOperator::In => "IN",
    }
}

fn associative(op: BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::And
            | BinaryOperator::Or
            | BinaryOperator::Plus
            | BinaryOperator::Multiply
            | BinaryOperator::Concat
    )
}

/// `'text'` with embedded quotes doubled
pub(crate) fn string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl Tokenizer<'_, '_> {
    /// Render an expression
    pub fn tokenize_expr(&mut self, e: &Expr) -> CompileResult<Token> {
        match e {
            Expr::Const(c) => Ok(Token::lit(self.constant(c))),
            Expr::Ident(id) if id.name == "*" => Ok(Token::lit("*")),
            Expr::Ident(id) => Ok(match self.qualifiers.get(&id.name) {
                Some(Qualifier::Named(name)) => Token::lit(name.clone()),
                _ => Token::lit(self.dialect.escape_ident(&id.name)),
            }),
            Expr::Property { .. } => self.property(e),
            Expr::Product { fields, .. } => {
                let items: Vec<Expr> = fields.iter().map(|(_, f)| f.clone()).collect();
                Ok(Token::parens(self.expr_list(&items)?))
            }
            Expr::BinaryOp { a, op, b } => self.binary(e, a, *op, b),
            Expr::UnaryOp { op, expr } => self.unary(e, *op, expr),
            Expr::When { branches, or_else } => {
                let mut parts = vec![Token::lit("CASE")];
                for branch in branches {
                    parts.push(Token::lit("WHEN"));
                    parts.push(self.tokenize_expr(&branch.cond)?);
                    parts.push(Token::lit("THEN"));
                    parts.push(self.tokenize_expr(&branch.then)?);
                }
                parts.push(Token::lit("ELSE"));
                parts.push(self.tokenize_expr(or_else)?);
                parts.push(Token::lit("END"));
                Ok(Token::spaced(parts))
            }
            Expr::MethodCall { .. } | Expr::GlobalCall { .. } => self.call(e),
            Expr::QueryAsExpr(q) => Ok(Token::parens(self.subquery(q)?)),
            Expr::Param { bid, kind, .. } => Ok(match kind {
                ParamKind::Single => Token::Param { bid: bid.clone() },
                ParamKind::List => Token::ParamList { bid: bid.clone() },
                ParamKind::Batch => Token::BatchParam { bid: bid.clone() },
            }),
            Expr::TagForSqlExpr { bid, .. } => Err(CompileError::MissingSplice { bid: bid.clone() }),
            Expr::Function { .. } | Expr::FunctionApply { .. } | Expr::Block { .. } => Err(
                CompileError::invariant("tokenize", "unreduced function reached rendering", e),
            ),
        }
    }

    fn constant(&self, c: &Constant) -> String {
        match c {
            Constant::Int(v) => v.to_string(),
            Constant::Long(v) => v.to_string(),
            Constant::Double(v) => format!("{v:?}"),
            Constant::String(s) => string_literal(s),
            Constant::Bool(b) => self.dialect.boolean_literal(*b).to_string(),
            Constant::Null => "NULL".to_string(),
        }
    }

    /// Render `e` as an operand, parenthesized when it binds looser than
    /// `min`
    pub(super) fn operand(&mut self, e: &Expr, min: u8) -> CompileResult<Token> {
        let token = self.tokenize_expr(e)?;
        Ok(if precedence(e) < min {
            Token::parens(token)
        } else {
            token
        })
    }

    /// `root.a.b` renders as `root.a_b`; hidden segments are skipped
    fn property(&mut self, e: &Expr) -> CompileResult<Token> {
        let mut segments = Vec::new();
        let mut current = e;
        while let Expr::Property {
            of,
            name,
            visibility,
        } = current
        {
            if *visibility == Visibility::Visible {
                segments.push(name.as_str());
            }
            current = of;
        }
        segments.reverse();
        if segments.is_empty() {
            return self.tokenize_expr(current);
        }
        let column = self.dialect.escape_ident(&segments.join("_"));
        let Expr::Ident(root) = current else {
            let root = self.operand(current, ATOM)?;
            return Ok(Token::seq(vec![root, Token::lit(format!(".{column}"))]));
        };
        Ok(match self.qualifiers.get(&root.name) {
            Some(Qualifier::Named(q)) => Token::lit(format!("{q}.{column}")),
            Some(Qualifier::Bare) => Token::lit(column),
            Some(Qualifier::Values) => Token::lit(format!("VALUES({column})")),
            None if root.is_hidden() => Token::lit(column),
            None => Token::lit(format!(
                "{}.{column}",
                self.dialect.escape_ident(&root.name)
            )),
        })
    }

    fn binary(&mut self, e: &Expr, a: &Expr, op: BinaryOperator, b: &Expr) -> CompileResult<Token> {
        match op {
            BinaryOperator::Eq | BinaryOperator::NotEq if a.is_null() || b.is_null() => {
                let value = if a.is_null() { b } else { a };
                let test = if op == BinaryOperator::Eq {
                    "IS NULL"
                } else {
                    "IS NOT NULL"
                };
                return Ok(Token::spaced(vec![self.operand(value, 5)?, Token::lit(test)]));
            }
            BinaryOperator::In => return self.membership(a, b),
            BinaryOperator::Concat => {
                if let ConcatStyle::Function = self.dialect.concat() {
                    let args = vec![self.tokenize_expr(a)?, self.tokenize_expr(b)?];
                    return Ok(crate::dialect::call("CONCAT", args));
                }
            }
            _ => {}
        }
        let p = precedence(e);
        let sql = match (op, self.dialect.concat()) {
            (BinaryOperator::Concat, ConcatStyle::Operator(sym)) => sym,
            _ => operator_sql(op),
        };
        let (left_min, right_min) = if op.is_comparison() {
            (p + 1, p + 1)
        } else if associative(op) {
            (p, p)
        } else {
            (p, p + 1)
        };
        Ok(Token::spaced(vec![
            self.operand(a, left_min)?,
            Token::lit(sql),
            self.operand(b, right_min)?,
        ]))
    }

    /// `a IN (...)` over a list parameter, a subquery or a literal tuple
    pub(super) fn membership(&mut self, a: &Expr, b: &Expr) -> CompileResult<Token> {
        let left = self.operand(a, 5)?;
        let right = match b {
            Expr::Param {
                bid,
                kind: ParamKind::List,
                ..
            } => Token::parens(Token::ParamList { bid: bid.clone() }),
            Expr::QueryAsExpr(q) => Token::parens(self.subquery(q)?),
            Expr::Product { .. } => self.tokenize_expr(b)?,
            other => Token::parens(self.tokenize_expr(other)?),
        };
        Ok(Token::spaced(vec![left, Token::lit("IN"), right]))
    }

    fn unary(&mut self, e: &Expr, op: UnaryOperator, inner: &Expr) -> CompileResult<Token> {
        match op {
            UnaryOperator::Not => Ok(Token::spaced(vec![
                Token::lit("NOT"),
                self.operand(inner, 4)?,
            ])),
            UnaryOperator::Minus => Ok(Token::seq(vec![
                Token::lit("-"),
                self.operand(inner, ATOM)?,
            ])),
            UnaryOperator::IsEmpty | UnaryOperator::NonEmpty => {
                let Expr::QueryAsExpr(q) = inner else {
                    return Err(CompileError::invariant(
                        "tokenize",
                        "EXISTS over a non-query operand",
                        e,
                    ));
                };
                let keyword = if op == UnaryOperator::IsEmpty {
                    "NOT EXISTS"
                } else {
                    "EXISTS"
                };
                Ok(Token::spaced(vec![
                    Token::lit(keyword),
                    Token::parens(self.subquery(q)?),
                ]))
            }
        }
    }
}
