//! Normalization pipeline
//!
//! `desugar -> beta -> repropagate`, then the core passes in a fixed order
//! until none of them reports a change. Every phase re-raises failures tagged
//! with its name.

use crate::beta::{reduce_action, reduce_expr, reduce_query};
use crate::pass::desugar::DesugarCustom;
use crate::pass::repropagate::{retype, retype_action};
use crate::pass::{
    adhoc, alias_push, apply_map, dealias, null_checks, symbolic, NormalizePass, PassContext,
};
use qx_core::config::CompilerConfig;
use qx_core::error::{CompileError, CompileResult};
use qx_core::trace::TraceType;
use qx_core::xr::visit::Rewrite;
use qx_core::xr::{Action, Expr, Query};
use std::collections::HashMap;
use std::fmt::Display;

/// Default bound on core-normalization rounds
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Runs the rewrite pipeline to a fixed point
pub struct Normalizer {
    passes: Vec<Box<dyn NormalizePass>>,
    max_iterations: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Normalizer {
    /// Create a Normalizer with all built-in core passes registered
    pub fn with_defaults() -> Self {
        Self {
            passes: vec![
                Box::new(symbolic::SymbolicReduction),
                Box::new(apply_map::ApplyMap),
                Box::new(adhoc::AdHocReduction),
                Box::new(dealias::Dealias),
                Box::new(alias_push::AliasPush),
                Box::new(null_checks::NullChecks),
            ],
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Create a Normalizer honoring the configured iteration bound
    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::with_defaults().with_max_iterations(config.max_normalize_iterations)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// List the core pass names in execution order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Bring a query to normal form
    pub fn normalize(&self, q: &Query, ctx: &mut PassContext<'_>) -> CompileResult<Query> {
        let desugared = phase("desugar", q, ctx, |q, ctx| {
            Ok(DesugarCustom.apply(q, ctx)?.unwrap_or_else(|| q.clone()))
        })?;
        let reduced = phase("beta", &desugared, ctx, |q, ctx| {
            reduce_query(q, HashMap::new(), &mut ctx.fresh)
        })?;
        let typed = phase("repropagate", &reduced, ctx, |q, _| retype(q))?;
        self.core(typed, ctx)
    }

    fn core(&self, mut current: Query, ctx: &mut PassContext<'_>) -> CompileResult<Query> {
        for round in 0..self.max_iterations {
            let mut changed = false;
            for pass in &self.passes {
                let name = pass.name();
                let next = pass.apply(&current, ctx).map_err(|e| e.in_phase(name))?;
                if let Some(next) = next {
                    ctx.tracer.trace(TraceType::Normalizations, || {
                        format!("{name}: {current} -> {next}")
                    });
                    current = next;
                    changed = true;
                }
            }
            if !changed {
                log::debug!("normalization converged after {round} rounds");
                return Ok(current);
            }
            current = retype(&current).map_err(|e| e.in_phase("repropagate"))?;
        }
        Err(CompileError::invariant(
            "normalize",
            format!("no fixpoint after {} rounds", self.max_iterations),
            current,
        ))
    }

    /// Reduce an expression and normalize every query nested in it
    pub fn normalize_expr(&self, e: &Expr, ctx: &mut PassContext<'_>) -> CompileResult<Expr> {
        let reduced = phase("beta", e, ctx, |e, ctx| {
            reduce_expr(e, HashMap::new(), &mut ctx.fresh)
        })?;
        Nested { normalizer: self, ctx }.rewrite_expr(&reduced)
    }

    /// Reduce an action and normalize every query nested in it
    pub fn normalize_action(&self, a: &Action, ctx: &mut PassContext<'_>) -> CompileResult<Action> {
        let reduced = phase("beta", a, ctx, |a, ctx| reduce_action(a, &mut ctx.fresh))?;
        let typed = phase("repropagate", &reduced, ctx, |a, _| retype_action(a))?;
        Nested { normalizer: self, ctx }.rewrite_action(&typed)
    }
}

/// Run one phase, tagging failures and tracing `name: before -> after`
fn phase<T, F>(name: &str, input: &T, ctx: &mut PassContext<'_>, run: F) -> CompileResult<T>
where
    T: Display + PartialEq,
    F: FnOnce(&T, &mut PassContext<'_>) -> CompileResult<T>,
{
    let out = run(input, ctx).map_err(|e| e.in_phase(name))?;
    if &out != input {
        ctx.tracer
            .trace(TraceType::Normalizations, || format!("{name}: {input} -> {out}"));
    }
    Ok(out)
}

/// Normalizes queries found inside expressions and actions
struct Nested<'n, 'c, 't> {
    normalizer: &'n Normalizer,
    ctx: &'c mut PassContext<'t>,
}

impl Rewrite for Nested<'_, '_, '_> {
    fn rewrite_query(&mut self, q: &Query) -> CompileResult<Query> {
        self.normalizer.normalize(q, self.ctx)
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
