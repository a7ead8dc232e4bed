//! Capture-avoiding beta reduction
//!
//! Substitutes identifiers with expressions across queries, expressions and
//! actions, renaming binders that would capture a free variable of a
//! replacement. Record projection over a literal product, lambda
//! application and `val` blocks are reduced on the way.

use qx_core::error::{CompileError, CompileResult};
use qx_core::xr::collect::{free_idents, free_idents_query};
use qx_core::xr::visit::{walk_action, walk_expr, walk_query, Rewrite};
use qx_core::xr::{Action, Assignment, ConflictResolution, Expr, Ident, Query};
use std::collections::{HashMap, HashSet};

/// Bound on reduction rounds before giving up
const MAX_ROUNDS: usize = 100;

/// Mints fresh identifier names for one compilation
#[derive(Debug, Default)]
pub struct FreshNames {
    counter: usize,
}

impl FreshNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// `base` followed by the next counter value not in `avoid`
    pub fn fresh(&mut self, base: &Ident, avoid: &HashSet<String>) -> Ident {
        let stem = base.name.trim_end_matches(|c: char| c.is_ascii_digit());
        let stem = if stem.is_empty() { "x" } else { stem };
        loop {
            self.counter += 1;
            let candidate = format!("{stem}{}", self.counter);
            if !avoid.contains(&candidate) {
                return base.with_name(candidate);
            }
        }
    }
}

/// One substitution pass
pub struct BetaReduction<'a> {
    map: HashMap<Ident, Expr>,
    fresh: &'a mut FreshNames,
}

impl<'a> BetaReduction<'a> {
    pub fn new(map: HashMap<Ident, Expr>, fresh: &'a mut FreshNames) -> Self {
        Self { map, fresh }
    }

    /// Run `f` with `binder` shadowing the substitution, renaming the binder
    /// when a replacement would otherwise be captured by it
    fn under_binders<T>(
        &mut self,
        binders: &[Ident],
        body_free: &[Ident],
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<(Vec<Ident>, T)> {
        if self.map.is_empty() {
            return Ok((binders.to_vec(), f(self)?));
        }
        let saved = self.map.clone();
        for binder in binders {
            self.map.remove(binder);
        }

        let mut renamed = Vec::with_capacity(binders.len());
        for binder in binders {
            let captured = self.map.iter().any(|(k, v)| {
                body_free.contains(k) && free_idents(v).iter().any(|fv| fv == binder)
            });
            if captured {
                let mut avoid: HashSet<String> =
                    body_free.iter().map(|i| i.name.clone()).collect();
                for (k, v) in &self.map {
                    avoid.insert(k.name.clone());
                    avoid.extend(free_idents(v).into_iter().map(|i| i.name));
                }
                avoid.extend(binders.iter().map(|b| b.name.clone()));
                let fresh = self.fresh.fresh(binder, &avoid);
                log::debug!("beta: renaming binder {} to {} to avoid capture", binder, fresh);
                self.map.insert(binder.clone(), Expr::Ident(fresh.clone()));
                renamed.push(fresh);
            } else {
                renamed.push(binder.clone());
            }
        }

        let result = f(self);
        self.map = saved;
        Ok((renamed, result?))
    }

    fn under_binder_expr(&mut self, binder: &Ident, body: &Expr) -> CompileResult<(Ident, Expr)> {
        let free = free_idents(body);
        let (mut ids, body) = self.under_binders(std::slice::from_ref(binder), &free, |s| {
            s.rewrite_expr(body)
        })?;
        Ok((ids.remove(0), body))
    }

    fn under_binder_query(
        &mut self,
        binder: &Ident,
        body: &Query,
    ) -> CompileResult<(Ident, Query)> {
        let free = free_idents_query(body);
        let (mut ids, body) = self.under_binders(std::slice::from_ref(binder), &free, |s| {
            s.rewrite_query(body)
        })?;
        Ok((ids.remove(0), body))
    }

    fn substitute(&self, occurrence: &Ident) -> CompileResult<Option<Expr>> {
        let Some(replacement) = self.map.get(occurrence) else {
            return Ok(None);
        };
        let replacement_type = replacement.tpe();
        if occurrence.tpe.least_upper_type(&replacement_type).is_none() {
            return Err(CompileError::TypeMismatch {
                ident: occurrence.name.clone(),
                declared: occurrence.tpe.to_string(),
                replacement: replacement_type.to_string(),
            });
        }
        Ok(Some(replacement.clone()))
    }

    fn apply_function(&mut self, params: &[Ident], body: &Expr, args: Vec<Expr>) -> CompileResult<Expr> {
        let map: HashMap<Ident, Expr> = params.iter().cloned().zip(args).collect();
        let mut inner = BetaReduction::new(map, &mut *self.fresh);
        inner.rewrite_expr(body)
    }

    fn reduce_block(&mut self, bindings: &[(Ident, Expr)], output: &Expr) -> CompileResult<Expr> {
        let mut out = output.clone();
        for (ident, value) in bindings.iter().rev() {
            let map = HashMap::from([(ident.clone(), value.clone())]);
            let mut inner = BetaReduction::new(map, &mut *self.fresh);
            out = inner.rewrite_expr(&out)?;
        }
        self.rewrite_expr(&out)
    }

    fn assignment(&mut self, a: &Assignment) -> CompileResult<Assignment> {
        let mut free = free_idents(&a.property);
        free.extend(free_idents(&a.value));
        let (mut ids, (property, value)) =
            self.under_binders(std::slice::from_ref(&a.alias), &free, |s| {
                Ok((s.rewrite_expr(&a.property)?, s.rewrite_expr(&a.value)?))
            })?;
        Ok(Assignment {
            alias: ids.remove(0),
            property,
            value,
        })
    }
}

impl Rewrite for BetaReduction<'_> {
    fn rewrite_expr(&mut self, e: &Expr) -> CompileResult<Expr> {
        match e {
            Expr::Ident(id) => Ok(self.substitute(id)?.unwrap_or_else(|| e.clone())),
            Expr::Property {
                of,
                name,
                visibility,
            } => {
                let of = self.rewrite_expr(of)?;
                if let Expr::Product { fields, .. } = &of {
                    if let Some((_, field)) = fields.iter().find(|(n, _)| n == name) {
                        return Ok(field.clone());
                    }
                }
                Ok(Expr::Property {
                    of: Box::new(of),
                    name: name.clone(),
                    visibility: *visibility,
                })
            }
            Expr::FunctionApply { function, args } => {
                let function = self.rewrite_expr(function)?;
                let args = args
                    .iter()
                    .map(|a| self.rewrite_expr(a))
                    .collect::<CompileResult<Vec<_>>>()?;
                match &function {
                    Expr::Function { params, body } if params.len() == args.len() => {
                        self.apply_function(params, body, args)
                    }
                    _ => Ok(Expr::FunctionApply {
                        function: Box::new(function),
                        args,
                    }),
                }
            }
            Expr::Function { params, body } => {
                let free = free_idents(body);
                let (params, body) = self.under_binders(params, &free, |s| s.rewrite_expr(body))?;
                Ok(Expr::Function {
                    params,
                    body: Box::new(body),
                })
            }
            Expr::Block { bindings, output } => self.reduce_block(bindings, output),
            Expr::QueryAsExpr(q) => match self.rewrite_query(q)? {
                Query::ExprAsQuery { expr } => Ok(expr),
                other => Ok(Expr::QueryAsExpr(Box::new(other))),
            },
            other => walk_expr(self, other),
        }
    }

    fn rewrite_query(&mut self, q: &Query) -> CompileResult<Query> {
        match q {
            Query::Filter {
                source,
                alias,
                body,
            } => {
                let source = Box::new(self.rewrite_query(source)?);
                let (alias, body) = self.under_binder_expr(alias, body)?;
                Ok(Query::Filter {
                    source,
                    alias,
                    body,
                })
            }
            Query::Map {
                source,
                alias,
                body,
            } => {
                let source = Box::new(self.rewrite_query(source)?);
                let (alias, body) = self.under_binder_expr(alias, body)?;
                Ok(Query::Map {
                    source,
                    alias,
                    body,
                })
            }
            Query::ConcatMap {
                source,
                alias,
                body,
            } => {
                let source = Box::new(self.rewrite_query(source)?);
                let (alias, body) = self.under_binder_expr(alias, body)?;
                Ok(Query::ConcatMap {
                    source,
                    alias,
                    body,
                })
            }
            Query::FlatMap {
                source,
                alias,
                body,
            } => {
                let source = Box::new(self.rewrite_query(source)?);
                let (alias, body) = self.under_binder_query(alias, body)?;
                Ok(Query::FlatMap {
                    source,
                    alias,
                    body: Box::new(body),
                })
            }
            Query::SortBy {
                source,
                alias,
                criteria,
                ordering,
            } => {
                let source = Box::new(self.rewrite_query(source)?);
                let (alias, criteria) = self.under_binder_expr(alias, criteria)?;
                Ok(Query::SortBy {
                    source,
                    alias,
                    criteria,
                    ordering: ordering.clone(),
                })
            }
            Query::DistinctOn { source, alias, by } => {
                let source = Box::new(self.rewrite_query(source)?);
                let (alias, by) = self.under_binder_expr(alias, by)?;
                Ok(Query::DistinctOn { source, alias, by })
            }
            Query::GroupByMap {
                source,
                by_alias,
                by,
                map_alias,
                map,
            } => {
                let source = Box::new(self.rewrite_query(source)?);
                let (by_alias, by) = self.under_binder_expr(by_alias, by)?;
                let (map_alias, map) = self.under_binder_expr(map_alias, map)?;
                Ok(Query::GroupByMap {
                    source,
                    by_alias,
                    by,
                    map_alias,
                    map,
                })
            }
            Query::FlatJoin {
                kind,
                source,
                alias,
                on,
            } => {
                let source = Box::new(self.rewrite_query(source)?);
                let (alias, on) = self.under_binder_expr(alias, on)?;
                Ok(Query::FlatJoin {
                    kind: *kind,
                    source,
                    alias,
                    on,
                })
            }
            Query::ExprAsQuery { expr } => match self.rewrite_expr(expr)? {
                Expr::QueryAsExpr(inner) => Ok(*inner),
                expr => Ok(Query::ExprAsQuery { expr }),
            },
            other => walk_query(self, other),
        }
    }

    fn rewrite_action(&mut self, a: &Action) -> CompileResult<Action> {
        match a {
            Action::Insert {
                entity,
                assignments,
            } => Ok(Action::Insert {
                entity: self.rewrite_query(entity)?,
                assignments: assignments
                    .iter()
                    .map(|x| self.assignment(x))
                    .collect::<CompileResult<_>>()?,
            }),
            Action::Update {
                entity,
                assignments,
            } => Ok(Action::Update {
                entity: self.rewrite_query(entity)?,
                assignments: assignments
                    .iter()
                    .map(|x| self.assignment(x))
                    .collect::<CompileResult<_>>()?,
            }),
            Action::FilteredAction {
                action,
                alias,
                filter,
            } => {
                let action = Box::new(self.rewrite_action(action)?);
                let (alias, filter) = self.under_binder_expr(alias, filter)?;
                Ok(Action::FilteredAction {
                    action,
                    alias,
                    filter,
                })
            }
            Action::Returning {
                action,
                alias,
                output,
            } => {
                let action = Box::new(self.rewrite_action(action)?);
                let (alias, output) = self.under_binder_expr(alias, output)?;
                Ok(Action::Returning {
                    action,
                    alias,
                    output,
                })
            }
            Action::OnConflict {
                insert,
                target,
                resolution:
                    ConflictResolution::Update {
                        existing,
                        excluded,
                        assignments,
                    },
            } => {
                let insert = Box::new(self.rewrite_action(insert)?);
                let mut free = Vec::new();
                for x in assignments {
                    free.extend(free_idents(&x.property));
                    free.extend(free_idents(&x.value));
                }
                let binders = [existing.clone(), excluded.clone()];
                let (ids, assignments) = self.under_binders(&binders, &free, |s| {
                    assignments
                        .iter()
                        .map(|x| s.assignment(x))
                        .collect::<CompileResult<Vec<_>>>()
                })?;
                Ok(Action::OnConflict {
                    insert,
                    target: target.clone(),
                    resolution: ConflictResolution::Update {
                        existing: ids[0].clone(),
                        excluded: ids[1].clone(),
                        assignments,
                    },
                })
            }
            other => walk_action(self, other),
        }
    }
}

fn fixpoint<T: PartialEq + std::fmt::Display>(
    mut tree: T,
    fresh: &mut FreshNames,
    step: impl Fn(&mut BetaReduction<'_>, &T) -> CompileResult<T>,
) -> CompileResult<T> {
    for _ in 0..MAX_ROUNDS {
        let mut pass = BetaReduction::new(HashMap::new(), fresh);
        let next = step(&mut pass, &tree)?;
        if next == tree {
            return Ok(tree);
        }
        tree = next;
    }
    Err(CompileError::invariant(
        "beta-reduction",
        format!("no fixpoint after {MAX_ROUNDS} rounds"),
        tree,
    ))
}

/// Substitute `map` into an expression and reduce to a fixpoint
pub fn reduce_expr(
    e: &Expr,
    map: HashMap<Ident, Expr>,
    fresh: &mut FreshNames,
) -> CompileResult<Expr> {
    let first = BetaReduction::new(map, fresh).rewrite_expr(e)?;
    fixpoint(first, fresh, |pass, t| pass.rewrite_expr(t))
}

/// Substitute `map` into a query and reduce to a fixpoint
pub fn reduce_query(
    q: &Query,
    map: HashMap<Ident, Expr>,
    fresh: &mut FreshNames,
) -> CompileResult<Query> {
    let first = BetaReduction::new(map, fresh).rewrite_query(q)?;
    fixpoint(first, fresh, |pass, t| pass.rewrite_query(t))
}

/// Reduce an action to a fixpoint
pub fn reduce_action(a: &Action, fresh: &mut FreshNames) -> CompileResult<Action> {
    fixpoint(a.clone(), fresh, |pass, t| pass.rewrite_action(t))
}

/// `e[from := to]`
pub fn substitute(e: &Expr, from: &Ident, to: &Expr, fresh: &mut FreshNames) -> CompileResult<Expr> {
    reduce_expr(e, HashMap::from([(from.clone(), to.clone())]), fresh)
}

/// `q[from := to]`
pub fn substitute_query(
    q: &Query,
    from: &Ident,
    to: &Expr,
    fresh: &mut FreshNames,
) -> CompileResult<Query> {
    reduce_query(q, HashMap::from([(from.clone(), to.clone())]), fresh)
}

#[cfg(test)]
#[path = "beta_test.rs"]
mod tests;
