//! Null-check expansion
//!
//! `x == null` on a product becomes one `IS NULL` test per leaf column, and
//! `if (x == null) null else e` collapses to `e` when `e` already yields NULL
//! for a NULL `x`.

use super::{NormalizePass, PassContext};
use qx_core::error::CompileResult;
use qx_core::trace::TraceType;
use qx_core::xr::visit::{walk_expr, walk_expr_ref, Rewrite, Visit};
use qx_core::xr::{BinaryOperator, Branch, Expr, Query, UnaryOperator};

/// Expands product null checks and drops redundant null guards
pub struct NullChecks;

impl NormalizePass for NullChecks {
    fn name(&self) -> &'static str {
        "null_checks"
    }

    fn description(&self) -> &'static str {
        "Expands null checks on products and removes redundant null guards"
    }

    fn apply(&self, q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
        let out = NullCheckRewrite { ctx }.rewrite_query(q)?;
        Ok((&out != q).then_some(out))
    }
}

struct NullCheckRewrite<'c, 't> {
    ctx: &'c mut PassContext<'t>,
}

/// The operand of `x == null` / `null == x` with the given operator
fn null_tested(e: &Expr, op: BinaryOperator) -> Option<&Expr> {
    match e {
        Expr::BinaryOp { a, op: o, b } if *o == op => {
            if b.is_null() && !a.is_null() {
                Some(a)
            } else if a.is_null() && !b.is_null() {
                Some(b)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Returns true when NULL in any operand makes the whole expression NULL
fn null_propagating(e: &Expr) -> bool {
    match e {
        Expr::Ident(_) | Expr::Const(_) | Expr::Param { .. } => true,
        Expr::Property { of, .. } => null_propagating(of),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => null_propagating(expr),
        Expr::BinaryOp { a, op, b } => {
            !op.is_logical()
                && *op != BinaryOperator::In
                && !a.is_null()
                && !b.is_null()
                && null_propagating(a)
                && null_propagating(b)
        }
        _ => false,
    }
}

struct Contains<'a> {
    needle: &'a Expr,
    found: bool,
}

impl Visit for Contains<'_> {
    fn visit_expr(&mut self, e: &Expr) {
        if self.found {
            return;
        }
        if e == self.needle {
            self.found = true;
        } else {
            walk_expr_ref(self, e);
        }
    }
}

fn contains(haystack: &Expr, needle: &Expr) -> bool {
    let mut v = Contains {
        needle,
        found: false,
    };
    v.visit_expr(haystack);
    v.found
}

/// `if (x == null) null else e` and `if (x != null) e else null`
fn collapse_guard(branches: &[Branch], or_else: &Expr) -> Option<Expr> {
    let [branch] = branches else {
        return None;
    };
    let (tested, kept) = if let Some(x) = null_tested(&branch.cond, BinaryOperator::Eq) {
        if !branch.then.is_null() {
            return None;
        }
        (x, or_else)
    } else if let Some(x) = null_tested(&branch.cond, BinaryOperator::NotEq) {
        if !or_else.is_null() {
            return None;
        }
        (x, &branch.then)
    } else {
        return None;
    };
    (null_propagating(kept) && contains(kept, tested)).then(|| kept.clone())
}

/// Per-leaf null checks for a product-typed operand
fn expand(x: &Expr, op: BinaryOperator) -> Option<Expr> {
    let tpe = x.tpe();
    tpe.as_product()?;
    let checks = tpe.leaf_paths().into_iter().map(|(path, _)| {
        let column = path.into_iter().fold(x.clone(), |acc, name| acc.dot(name));
        Expr::binary(column, op, Expr::null())
    });
    match op {
        BinaryOperator::Eq => Expr::conjunction(checks),
        _ => Expr::disjunction(checks),
    }
}

impl Rewrite for NullCheckRewrite<'_, '_> {
    fn rewrite_expr(&mut self, e: &Expr) -> CompileResult<Expr> {
        if let Expr::When { branches, or_else } = e {
            if let Some(kept) = collapse_guard(branches, or_else) {
                self.ctx
                    .tracer
                    .trace(TraceType::SqlNormalizations, || format!("null guard removed: {e}"));
                return self.rewrite_expr(&kept);
            }
        }
        for op in [BinaryOperator::Eq, BinaryOperator::NotEq] {
            if let Some(x) = null_tested(e, op) {
                if let Some(expanded) = expand(x, op) {
                    return walk_expr(self, &expanded);
                }
            }
        }
        walk_expr(self, e)
    }
}
