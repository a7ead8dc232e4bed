//! Type repropagation
//!
//! Substitution can leave a binder typed with what the front end knew at
//! capture time while its source now produces something more precise. This
//! pass re-derives every binder type from its source and rewrites each bound
//! occurrence to match.

use super::{NormalizePass, PassContext};
use qx_core::error::CompileResult;
use qx_core::xr::visit::{walk_action, walk_expr, walk_query, Rewrite};
use qx_core::xr::{
    Action, Assignment, ConflictResolution, ConflictTarget, Expr, Ident, Query, XrType,
};
use std::collections::HashMap;

/// Re-derives binder types bottom-up
pub struct RepropagateTypes;

impl NormalizePass for RepropagateTypes {
    fn name(&self) -> &'static str {
        "repropagate_types"
    }

    fn description(&self) -> &'static str {
        "Re-derives identifier types from the sources they range over"
    }

    fn apply(&self, q: &Query, _ctx: &mut PassContext<'_>) -> CompileResult<Option<Query>> {
        let out = retype(q)?;
        // identifier equality ignores types, compare the full structure
        Ok((format!("{out:?}") != format!("{q:?}")).then_some(out))
    }
}

/// Retype a whole query
pub fn retype(q: &Query) -> CompileResult<Query> {
    Retype::default().rewrite_query(q)
}

/// Retype an action
pub fn retype_action(a: &Action) -> CompileResult<Action> {
    Retype::default().rewrite_action(a)
}

#[derive(Default)]
struct Retype {
    scopes: Vec<HashMap<String, XrType>>,
}

/// Binder type given what its source produces
fn joined(declared: &XrType, produced: XrType) -> XrType {
    declared.least_upper_type(&produced).unwrap_or(produced)
}

impl Retype {
    fn lookup(&self, name: &str) -> Option<&XrType> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn bind(&mut self, alias: &Ident, produced: XrType) -> Ident {
        let typed = alias.with_type(joined(&alias.tpe, produced));
        self.scopes
            .push(HashMap::from([(typed.name.clone(), typed.tpe.clone())]));
        typed
    }

    fn scoped_expr(&mut self, alias: &Ident, produced: XrType, e: &Expr) -> CompileResult<(Ident, Expr)> {
        let alias = self.bind(alias, produced);
        let e = self.rewrite_expr(e);
        self.scopes.pop();
        Ok((alias, e?))
    }

    fn assignments(&mut self, items: &[Assignment], row: &XrType) -> CompileResult<Vec<Assignment>> {
        items
            .iter()
            .map(|a| {
                let alias = self.bind(&a.alias, row.clone());
                let property = self.rewrite_expr(&a.property);
                let value = self.rewrite_expr(&a.value);
                self.scopes.pop();
                Ok(Assignment {
                    alias,
                    property: property?,
                    value: value?,
                })
            })
            .collect()
    }
}

impl Rewrite for Retype {
    fn rewrite_query(&mut self, q: &Query) -> CompileResult<Query> {
        Ok(match q {
            Query::Filter {
                source,
                alias,
                body,
            } => {
                let source = self.rewrite_query(source)?;
                let (alias, body) = self.scoped_expr(alias, source.tpe(), body)?;
                source.filter(alias, body)
            }
            Query::Map {
                source,
                alias,
                body,
            } => {
                let source = self.rewrite_query(source)?;
                let (alias, body) = self.scoped_expr(alias, source.tpe(), body)?;
                source.map(alias, body)
            }
            Query::ConcatMap {
                source,
                alias,
                body,
            } => {
                let source = self.rewrite_query(source)?;
                let (alias, body) = self.scoped_expr(alias, source.tpe(), body)?;
                source.concat_map(alias, body)
            }
            Query::SortBy {
                source,
                alias,
                criteria,
                ordering,
            } => {
                let source = self.rewrite_query(source)?;
                let (alias, criteria) = self.scoped_expr(alias, source.tpe(), criteria)?;
                source.sort_by(alias, criteria, ordering.clone())
            }
            Query::DistinctOn { source, alias, by } => {
                let source = self.rewrite_query(source)?;
                let (alias, by) = self.scoped_expr(alias, source.tpe(), by)?;
                source.distinct_on(alias, by)
            }
            Query::GroupByMap {
                source,
                by_alias,
                by,
                map_alias,
                map,
            } => {
                let source = self.rewrite_query(source)?;
                let (by_alias, by) = self.scoped_expr(by_alias, source.tpe(), by)?;
                let (map_alias, map) = self.scoped_expr(map_alias, source.tpe(), map)?;
                source.group_by_map(by_alias, by, map_alias, map)
            }
            Query::FlatMap {
                source,
                alias,
                body,
            } => {
                let source = self.rewrite_query(source)?;
                let alias = self.bind(alias, source.tpe());
                let body = self.rewrite_query(body);
                self.scopes.pop();
                source.flat_map(alias, body?)
            }
            Query::FlatJoin {
                kind,
                source,
                alias,
                on,
            } => {
                let source = self.rewrite_query(source)?;
                let (alias, on) = self.scoped_expr(alias, source.tpe(), on)?;
                source.join(*kind, alias, on)
            }
            other => walk_query(self, other)?,
        })
    }

    fn rewrite_expr(&mut self, e: &Expr) -> CompileResult<Expr> {
        match e {
            Expr::Ident(id) => Ok(match self.lookup(&id.name) {
                Some(tpe) if *tpe != id.tpe => Expr::Ident(id.with_type(tpe.clone())),
                _ => e.clone(),
            }),
            Expr::Function { params, body } => {
                self.scopes.push(
                    params
                        .iter()
                        .map(|p| (p.name.clone(), p.tpe.clone()))
                        .collect(),
                );
                let body = self.rewrite_expr(body);
                self.scopes.pop();
                Ok(Expr::Function {
                    params: params.clone(),
                    body: Box::new(body?),
                })
            }
            Expr::Block { bindings, output } => {
                let depth = self.scopes.len();
                let mut typed = Vec::with_capacity(bindings.len());
                let mut failure = None;
                for (ident, value) in bindings {
                    match self.rewrite_expr(value) {
                        Ok(value) => {
                            let ident = self.bind(ident, value.tpe());
                            typed.push((ident, value));
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                let output = match failure {
                    Some(e) => Err(e),
                    None => self.rewrite_expr(output),
                };
                self.scopes.truncate(depth);
                Ok(Expr::Block {
                    bindings: typed,
                    output: Box::new(output?),
                })
            }
            other => walk_expr(self, other),
        }
    }

    fn rewrite_action(&mut self, a: &Action) -> CompileResult<Action> {
        let row = a.entity().tpe();
        Ok(match a {
            Action::Insert {
                entity,
                assignments,
            } => Action::Insert {
                entity: self.rewrite_query(entity)?,
                assignments: self.assignments(assignments, &row)?,
            },
            Action::Update {
                entity,
                assignments,
            } => Action::Update {
                entity: self.rewrite_query(entity)?,
                assignments: self.assignments(assignments, &row)?,
            },
            Action::FilteredAction {
                action,
                alias,
                filter,
            } => {
                let action = self.rewrite_action(action)?;
                let (alias, filter) = self.scoped_expr(alias, row, filter)?;
                Action::FilteredAction {
                    action: Box::new(action),
                    alias,
                    filter,
                }
            }
            Action::Returning {
                action,
                alias,
                output,
            } => {
                let action = self.rewrite_action(action)?;
                let (alias, output) = self.scoped_expr(alias, row, output)?;
                Action::Returning {
                    action: Box::new(action),
                    alias,
                    output,
                }
            }
            Action::OnConflict {
                insert,
                target,
                resolution,
            } => {
                let insert = Box::new(self.rewrite_action(insert)?);
                let target = match target {
                    ConflictTarget::Unspecified => ConflictTarget::Unspecified,
                    ConflictTarget::Properties(props) => ConflictTarget::Properties(
                        props
                            .iter()
                            .map(|p| self.rewrite_expr(p))
                            .collect::<CompileResult<_>>()?,
                    ),
                };
                let resolution = match resolution {
                    ConflictResolution::Ignore => ConflictResolution::Ignore,
                    ConflictResolution::Update {
                        existing,
                        excluded,
                        assignments,
                    } => {
                        let existing = self.bind(existing, row.clone());
                        let excluded = self.bind(excluded, row.clone());
                        let assignments = self.assignments(assignments, &row);
                        self.scopes.pop();
                        self.scopes.pop();
                        ConflictResolution::Update {
                            existing,
                            excluded,
                            assignments: assignments?,
                        }
                    }
                };
                Action::OnConflict {
                    insert,
                    target,
                    resolution,
                }
            }
            other => walk_action(self, other)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qx_core::test_utils::*;

    #[test]
    fn test_binder_takes_source_type() {
        let p = ident("p");
        let q = person_entity().filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)));
        let typed = person_ident("p");
        let expected = person_entity().filter(typed.clone(), gt(prop(&typed, "age"), Expr::int(18)));
        assert_eq!(retype(&q).unwrap(), expected);
    }

    #[test]
    fn test_map_output_flows_into_next_binder() {
        let p = ident("p");
        let n = ident("n");
        let q = person_entity()
            .map(p.clone(), prop(&p, "name"))
            .filter(n.clone(), eq(Expr::id(&n), Expr::string("Joe")));
        let Query::Filter { alias, body, .. } = retype(&q).unwrap() else {
            panic!("expected filter");
        };
        // `p.name` is a Value field of Person
        assert_eq!(alias.tpe, XrType::Value);
        assert_eq!(body, eq(Expr::Ident(n.with_type(XrType::Value)), Expr::string("Joe")));
    }

    #[test]
    fn test_function_parameter_shadows_binder() {
        let p = ident("p");
        let shadow = Ident::new("p", XrType::Value);
        let f = Expr::Function {
            params: vec![shadow.clone()],
            body: Box::new(Expr::id(&shadow)),
        };
        let q = person_entity().map(p.clone(), f.clone());
        let Query::Map { body, .. } = retype(&q).unwrap() else {
            panic!("expected map");
        };
        assert_eq!(body, f);
    }

    #[test]
    fn test_flat_join_alias_typed_in_on_clause() {
        let p = ident("p");
        let a = ident("a");
        let q = person_entity().flat_map(
            p.clone(),
            address_entity().join(
                qx_core::xr::JoinKind::Inner,
                a.clone(),
                eq(prop(&a, "personId"), prop(&p, "id")),
            ),
        );
        let Query::FlatMap { body, .. } = retype(&q).unwrap() else {
            panic!("expected flatMap");
        };
        let Query::FlatJoin { alias, on, .. } = *body else {
            panic!("expected join");
        };
        assert_eq!(alias, address_ident("a"));
        assert_eq!(on.tpe(), XrType::BooleanExpression);
        let typed_p = person_ident("p");
        let typed_a = address_ident("a");
        assert_eq!(on, eq(prop(&typed_a, "personId"), prop(&typed_p, "id")));
    }

    #[test]
    fn test_returning_alias_typed_from_table() {
        let x = ident("x");
        let action = Action::Returning {
            action: Box::new(Action::Delete {
                entity: person_entity(),
            }),
            alias: x.clone(),
            output: prop(&x, "id"),
        };
        let Action::Returning { alias, .. } = retype_action(&action).unwrap() else {
            panic!("expected returning");
        };
        assert_eq!(alias, person_ident("x"));
        assert!(alias.tpe.is_product());
    }
}
