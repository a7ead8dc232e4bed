//! Boolean vendorization for databases without a boolean type
//!
//! Positions are either predicates (WHERE, ON, CASE WHEN conditions and the
//! operands of AND / OR / NOT) or values (everything else). In a predicate
//! position a boolean value is compared with `1`; in a value position a
//! predicate is turned into `CASE WHEN p THEN 1 ELSE 0 END`. Boolean
//! literals become `1 = 1` / `1 = 0` as predicates and `1` / `0` as values.

use qx_core::error::CompileResult;
use qx_core::trace::{TraceType, Tracer};
use qx_core::xr::visit::{walk_action, walk_expr, walk_query};
use qx_core::xr::{
    Action, BinaryOperator, Branch, Constant, Expr, Query, Rewrite, UnaryOperator, XrType,
};

fn true_predicate() -> Expr {
    Expr::binary(Expr::int(1), BinaryOperator::Eq, Expr::int(1))
}

fn false_predicate() -> Expr {
    Expr::binary(Expr::int(1), BinaryOperator::Eq, Expr::int(0))
}

/// True for expressions that only make sense in a predicate position
fn is_predicate(e: &Expr) -> bool {
    match e {
        Expr::BinaryOp { op, .. } => op.is_predicate(),
        Expr::UnaryOp { op, .. } => !matches!(op, UnaryOperator::Minus),
        Expr::MethodCall { tpe, .. } | Expr::GlobalCall { tpe, .. } => {
            *tpe == XrType::BooleanExpression
        }
        _ => false,
    }
}

struct Vendorize<'t> {
    tracer: &'t mut Tracer,
}

impl Vendorize<'_> {
    /// Rewrite an expression sitting in a predicate position
    fn predicate(&mut self, e: &Expr) -> CompileResult<Expr> {
        Ok(match e {
            Expr::Const(Constant::Bool(true)) => true_predicate(),
            Expr::Const(Constant::Bool(false)) => false_predicate(),
            Expr::BinaryOp { a, op, b } if op.is_logical() => {
                Expr::binary(self.predicate(a)?, *op, self.predicate(b)?)
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => self.predicate(expr)?.not(),
            Expr::When { branches, or_else } => {
                let mut acc = self.predicate(or_else)?;
                for branch in branches.iter().rev() {
                    let cond = self.predicate(&branch.cond)?;
                    let then = self.predicate(&branch.then)?;
                    acc = cond.clone().and(then).or(cond.not().and(acc));
                }
                self.tracer
                    .trace(TraceType::Vendorization, || format!("case as predicate: {e}"));
                acc
            }
            e if is_predicate(e) => walk_expr(self, e)?,
            other => {
                let value = self.value(other)?;
                self.tracer
                    .trace(TraceType::Vendorization, || format!("{other} = 1"));
                Expr::binary(value, BinaryOperator::Eq, Expr::int(1))
            }
        })
    }

    /// Rewrite an expression sitting in a value position
    fn value(&mut self, e: &Expr) -> CompileResult<Expr> {
        Ok(match e {
            Expr::Const(Constant::Bool(b)) => Expr::int(i32::from(*b)),
            Expr::When { branches, or_else } => Expr::When {
                branches: branches
                    .iter()
                    .map(|br| {
                        Ok(Branch {
                            cond: self.predicate(&br.cond)?,
                            then: self.value(&br.then)?,
                        })
                    })
                    .collect::<CompileResult<Vec<_>>>()?,
                or_else: Box::new(self.value(or_else)?),
            },
            e if is_predicate(e) => {
                let pred = self.predicate(e)?;
                self.tracer
                    .trace(TraceType::Vendorization, || format!("predicate as value: {e}"));
                Expr::when(pred, Expr::int(1), Expr::int(0))
            }
            other => walk_expr(self, other)?,
        })
    }
}

impl Rewrite for Vendorize<'_> {
    fn rewrite_query(&mut self, q: &Query) -> CompileResult<Query> {
        Ok(match q {
            Query::Filter {
                source,
                alias,
                body,
            } => Query::Filter {
                source: Box::new(self.rewrite_query(source)?),
                alias: alias.clone(),
                body: self.predicate(body)?,
            },
            Query::FlatFilter { by } => Query::FlatFilter {
                by: self.predicate(by)?,
            },
            Query::FlatJoin {
                kind,
                source,
                alias,
                on,
            } => Query::FlatJoin {
                kind: *kind,
                source: Box::new(self.rewrite_query(source)?),
                alias: alias.clone(),
                on: self.predicate(on)?,
            },
            other => walk_query(self, other)?,
        })
    }

    fn rewrite_expr(&mut self, e: &Expr) -> CompileResult<Expr> {
        self.value(e)
    }

    fn rewrite_action(&mut self, a: &Action) -> CompileResult<Action> {
        match a {
            Action::FilteredAction {
                action,
                alias,
                filter,
            } => Ok(Action::FilteredAction {
                action: Box::new(self.rewrite_action(action)?),
                alias: alias.clone(),
                filter: self.predicate(filter)?,
            }),
            other => walk_action(self, other),
        }
    }
}

/// Vendorize every boolean in a normalized query
pub fn vendorize_query(q: &Query, tracer: &mut Tracer) -> CompileResult<Query> {
    Vendorize { tracer }.rewrite_query(q)
}

/// Vendorize an expression compiled on its own, which sits in a value position
pub fn vendorize_expr(e: &Expr, tracer: &mut Tracer) -> CompileResult<Expr> {
    Vendorize { tracer }.value(e)
}

/// Vendorize an action
pub fn vendorize_action(a: &Action, tracer: &mut Tracer) -> CompileResult<Action> {
    Vendorize { tracer }.rewrite_action(a)
}

#[cfg(test)]
#[path = "vendorize_test.rs"]
mod tests;
