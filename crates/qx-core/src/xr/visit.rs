//! Generic traversal over the XR variant family.
//!
//! Two shapes: [`Rewrite`] produces a new tree and may fail, [`Visit`] only
//! reads. Implementors override the node kinds they care about and call the
//! `walk_*` functions to recurse into the rest. Any state a traversal needs
//! lives in the implementing struct and is threaded through `&mut self`.

use super::action::{Action, Assignment, ConflictResolution, ConflictTarget};
use super::expr::{Branch, Expr};
use super::query::Query;
use crate::error::CompileResult;

/// Tree-to-tree rewrite
pub trait Rewrite {
    /// Rewrite a query; defaults to rewriting its children
    fn rewrite_query(&mut self, q: &Query) -> CompileResult<Query> {
        walk_query(self, q)
    }

    /// Rewrite an expression; defaults to rewriting its children
    fn rewrite_expr(&mut self, e: &Expr) -> CompileResult<Expr> {
        walk_expr(self, e)
    }

    /// Rewrite an action; defaults to rewriting its children
    fn rewrite_action(&mut self, a: &Action) -> CompileResult<Action> {
        walk_action(self, a)
    }
}

fn bq<R: Rewrite + ?Sized>(r: &mut R, q: &Query) -> CompileResult<Box<Query>> {
    Ok(Box::new(r.rewrite_query(q)?))
}

fn be<R: Rewrite + ?Sized>(r: &mut R, e: &Expr) -> CompileResult<Box<Expr>> {
    Ok(Box::new(r.rewrite_expr(e)?))
}

fn exprs<R: Rewrite + ?Sized>(r: &mut R, es: &[Expr]) -> CompileResult<Vec<Expr>> {
    es.iter().map(|e| r.rewrite_expr(e)).collect()
}

/// Rebuild a query from rewritten children. Binders are kept as they are.
pub fn walk_query<R: Rewrite + ?Sized>(r: &mut R, q: &Query) -> CompileResult<Query> {
    Ok(match q {
        Query::Entity { .. } | Query::TagForSqlQuery { .. } | Query::Custom(_) => q.clone(),
        Query::Filter {
            source,
            alias,
            body,
        } => Query::Filter {
            source: bq(r, source)?,
            alias: alias.clone(),
            body: r.rewrite_expr(body)?,
        },
        Query::Map {
            source,
            alias,
            body,
        } => Query::Map {
            source: bq(r, source)?,
            alias: alias.clone(),
            body: r.rewrite_expr(body)?,
        },
        Query::FlatMap {
            source,
            alias,
            body,
        } => Query::FlatMap {
            source: bq(r, source)?,
            alias: alias.clone(),
            body: bq(r, body)?,
        },
        Query::ConcatMap {
            source,
            alias,
            body,
        } => Query::ConcatMap {
            source: bq(r, source)?,
            alias: alias.clone(),
            body: r.rewrite_expr(body)?,
        },
        Query::SortBy {
            source,
            alias,
            criteria,
            ordering,
        } => Query::SortBy {
            source: bq(r, source)?,
            alias: alias.clone(),
            criteria: r.rewrite_expr(criteria)?,
            ordering: ordering.clone(),
        },
        Query::GroupByMap {
            source,
            by_alias,
            by,
            map_alias,
            map,
        } => Query::GroupByMap {
            source: bq(r, source)?,
            by_alias: by_alias.clone(),
            by: r.rewrite_expr(by)?,
            map_alias: map_alias.clone(),
            map: r.rewrite_expr(map)?,
        },
        Query::Take { source, count } => Query::Take {
            source: bq(r, source)?,
            count: r.rewrite_expr(count)?,
        },
        Query::Drop { source, count } => Query::Drop {
            source: bq(r, source)?,
            count: r.rewrite_expr(count)?,
        },
        Query::Distinct { source } => Query::Distinct {
            source: bq(r, source)?,
        },
        Query::DistinctOn { source, alias, by } => Query::DistinctOn {
            source: bq(r, source)?,
            alias: alias.clone(),
            by: r.rewrite_expr(by)?,
        },
        Query::Nested { source } => Query::Nested {
            source: bq(r, source)?,
        },
        Query::Union { a, b } => Query::Union {
            a: bq(r, a)?,
            b: bq(r, b)?,
        },
        Query::UnionAll { a, b } => Query::UnionAll {
            a: bq(r, a)?,
            b: bq(r, b)?,
        },
        Query::FlatJoin {
            kind,
            source,
            alias,
            on,
        } => Query::FlatJoin {
            kind: *kind,
            source: bq(r, source)?,
            alias: alias.clone(),
            on: r.rewrite_expr(on)?,
        },
        Query::FlatFilter { by } => Query::FlatFilter {
            by: r.rewrite_expr(by)?,
        },
        Query::FlatGroupBy { by } => Query::FlatGroupBy {
            by: r.rewrite_expr(by)?,
        },
        Query::FlatSortBy { by, ordering } => Query::FlatSortBy {
            by: r.rewrite_expr(by)?,
            ordering: ordering.clone(),
        },
        Query::ExprAsQuery { expr } => Query::ExprAsQuery {
            expr: r.rewrite_expr(expr)?,
        },
    })
}

/// Rebuild an expression from rewritten children
pub fn walk_expr<R: Rewrite + ?Sized>(r: &mut R, e: &Expr) -> CompileResult<Expr> {
    Ok(match e {
        Expr::Const(_) | Expr::Ident(_) | Expr::Param { .. } | Expr::TagForSqlExpr { .. } => {
            e.clone()
        }
        Expr::BinaryOp { a, op, b } => Expr::BinaryOp {
            a: be(r, a)?,
            op: *op,
            b: be(r, b)?,
        },
        Expr::UnaryOp { op, expr } => Expr::UnaryOp {
            op: *op,
            expr: be(r, expr)?,
        },
        Expr::Property {
            of,
            name,
            visibility,
        } => Expr::Property {
            of: be(r, of)?,
            name: name.clone(),
            visibility: *visibility,
        },
        Expr::Product { name, fields } => Expr::Product {
            name: name.clone(),
            fields: fields
                .iter()
                .map(|(n, v)| Ok((n.clone(), r.rewrite_expr(v)?)))
                .collect::<CompileResult<_>>()?,
        },
        Expr::When { branches, or_else } => Expr::When {
            branches: branches
                .iter()
                .map(|br| {
                    Ok(Branch {
                        cond: r.rewrite_expr(&br.cond)?,
                        then: r.rewrite_expr(&br.then)?,
                    })
                })
                .collect::<CompileResult<_>>()?,
            or_else: be(r, or_else)?,
        },
        Expr::MethodCall {
            head,
            name,
            args,
            kind,
            tpe,
        } => Expr::MethodCall {
            head: be(r, head)?,
            name: name.clone(),
            args: exprs(r, args)?,
            kind: *kind,
            tpe: tpe.clone(),
        },
        Expr::GlobalCall {
            name,
            args,
            kind,
            tpe,
        } => Expr::GlobalCall {
            name: name.clone(),
            args: exprs(r, args)?,
            kind: *kind,
            tpe: tpe.clone(),
        },
        Expr::QueryAsExpr(q) => Expr::QueryAsExpr(bq(r, q)?),
        Expr::Function { params, body } => Expr::Function {
            params: params.clone(),
            body: be(r, body)?,
        },
        Expr::FunctionApply { function, args } => Expr::FunctionApply {
            function: be(r, function)?,
            args: exprs(r, args)?,
        },
        Expr::Block { bindings, output } => Expr::Block {
            bindings: bindings
                .iter()
                .map(|(id, v)| Ok((id.clone(), r.rewrite_expr(v)?)))
                .collect::<CompileResult<_>>()?,
            output: be(r, output)?,
        },
    })
}

fn assignments<R: Rewrite + ?Sized>(
    r: &mut R,
    items: &[Assignment],
) -> CompileResult<Vec<Assignment>> {
    items
        .iter()
        .map(|a| {
            Ok(Assignment {
                alias: a.alias.clone(),
                property: r.rewrite_expr(&a.property)?,
                value: r.rewrite_expr(&a.value)?,
            })
        })
        .collect()
}

/// Rebuild an action from rewritten children
pub fn walk_action<R: Rewrite + ?Sized>(r: &mut R, a: &Action) -> CompileResult<Action> {
    Ok(match a {
        Action::Insert {
            entity,
            assignments: items,
        } => Action::Insert {
            entity: r.rewrite_query(entity)?,
            assignments: assignments(r, items)?,
        },
        Action::Update {
            entity,
            assignments: items,
        } => Action::Update {
            entity: r.rewrite_query(entity)?,
            assignments: assignments(r, items)?,
        },
        Action::Delete { entity } => Action::Delete {
            entity: r.rewrite_query(entity)?,
        },
        Action::FilteredAction {
            action,
            alias,
            filter,
        } => Action::FilteredAction {
            action: Box::new(r.rewrite_action(action)?),
            alias: alias.clone(),
            filter: r.rewrite_expr(filter)?,
        },
        Action::OnConflict {
            insert,
            target,
            resolution,
        } => Action::OnConflict {
            insert: Box::new(r.rewrite_action(insert)?),
            target: match target {
                ConflictTarget::Unspecified => ConflictTarget::Unspecified,
                ConflictTarget::Properties(props) => ConflictTarget::Properties(exprs(r, props)?),
            },
            resolution: match resolution {
                ConflictResolution::Ignore => ConflictResolution::Ignore,
                ConflictResolution::Update {
                    existing,
                    excluded,
                    assignments: items,
                } => ConflictResolution::Update {
                    existing: existing.clone(),
                    excluded: excluded.clone(),
                    assignments: assignments(r, items)?,
                },
            },
        },
        Action::Returning {
            action,
            alias,
            output,
        } => Action::Returning {
            action: Box::new(r.rewrite_action(action)?),
            alias: alias.clone(),
            output: r.rewrite_expr(output)?,
        },
    })
}

/// Read-only traversal
pub trait Visit {
    /// Visit a query; defaults to visiting its children
    fn visit_query(&mut self, q: &Query) {
        walk_query_ref(self, q)
    }

    /// Visit an expression; defaults to visiting its children
    fn visit_expr(&mut self, e: &Expr) {
        walk_expr_ref(self, e)
    }
}

/// Visit the children of a query in source order
pub fn walk_query_ref<V: Visit + ?Sized>(v: &mut V, q: &Query) {
    match q {
        Query::Entity { .. } | Query::TagForSqlQuery { .. } | Query::Custom(_) => {}
        Query::Filter { source, body, .. }
        | Query::Map { source, body, .. }
        | Query::ConcatMap { source, body, .. } => {
            v.visit_query(source);
            v.visit_expr(body);
        }
        Query::FlatMap { source, body, .. } => {
            v.visit_query(source);
            v.visit_query(body);
        }
        Query::SortBy {
            source, criteria, ..
        } => {
            v.visit_query(source);
            v.visit_expr(criteria);
        }
        Query::GroupByMap {
            source, by, map, ..
        } => {
            v.visit_query(source);
            v.visit_expr(by);
            v.visit_expr(map);
        }
        Query::Take { source, count } | Query::Drop { source, count } => {
            v.visit_query(source);
            v.visit_expr(count);
        }
        Query::Distinct { source } | Query::Nested { source } => v.visit_query(source),
        Query::DistinctOn { source, by, .. } => {
            v.visit_query(source);
            v.visit_expr(by);
        }
        Query::Union { a, b } | Query::UnionAll { a, b } => {
            v.visit_query(a);
            v.visit_query(b);
        }
        Query::FlatJoin { source, on, .. } => {
            v.visit_query(source);
            v.visit_expr(on);
        }
        Query::FlatFilter { by } | Query::FlatGroupBy { by } | Query::FlatSortBy { by, .. } => {
            v.visit_expr(by)
        }
        Query::ExprAsQuery { expr } => v.visit_expr(expr),
    }
}

/// Visit the children of an expression in source order
pub fn walk_expr_ref<V: Visit + ?Sized>(v: &mut V, e: &Expr) {
    match e {
        Expr::Const(_) | Expr::Ident(_) | Expr::Param { .. } | Expr::TagForSqlExpr { .. } => {}
        Expr::BinaryOp { a, b, .. } => {
            v.visit_expr(a);
            v.visit_expr(b);
        }
        Expr::UnaryOp { expr, .. } => v.visit_expr(expr),
        Expr::Property { of, .. } => v.visit_expr(of),
        Expr::Product { fields, .. } => fields.iter().for_each(|(_, f)| v.visit_expr(f)),
        Expr::When { branches, or_else } => {
            for br in branches {
                v.visit_expr(&br.cond);
                v.visit_expr(&br.then);
            }
            v.visit_expr(or_else);
        }
        Expr::MethodCall { head, args, .. } => {
            v.visit_expr(head);
            args.iter().for_each(|a| v.visit_expr(a));
        }
        Expr::GlobalCall { args, .. } => args.iter().for_each(|a| v.visit_expr(a)),
        Expr::QueryAsExpr(q) => v.visit_query(q),
        Expr::Function { body, .. } => v.visit_expr(body),
        Expr::FunctionApply { function, args } => {
            v.visit_expr(function);
            args.iter().for_each(|a| v.visit_expr(a));
        }
        Expr::Block { bindings, output } => {
            bindings.iter().for_each(|(_, b)| v.visit_expr(b));
            v.visit_expr(output);
        }
    }
}
