//! `SELECT ... FROM ... WHERE ...` sugar built on the custom-query capability

use super::expr::Expr;
use super::ident::Ident;
use super::query::{CustomQuery, CustomQueryRef, JoinKind, Ordering, Query, QueryPosition};
use super::types::XrType;
use crate::error::{CompileError, CompileResult};

/// One row source of a select clause
#[derive(Debug, Clone, PartialEq)]
pub enum SelectBinding {
    /// `FROM source alias`
    From { alias: Ident, source: Query },
    /// `kind JOIN source alias ON on`
    Join {
        kind: JoinKind,
        alias: Ident,
        source: Query,
        on: Expr,
    },
}

/// A select clause with row sources in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    pub bindings: Vec<SelectBinding>,
    pub where_: Option<Expr>,
    pub group_by: Option<Expr>,
    pub sort_by: Option<(Expr, Ordering)>,
    pub select: Expr,
}

impl SelectClause {
    /// A clause projecting `select`, with no sources yet
    pub fn new(select: Expr) -> Self {
        Self {
            bindings: Vec::new(),
            where_: None,
            group_by: None,
            sort_by: None,
            select,
        }
    }

    pub fn from(mut self, alias: Ident, source: Query) -> Self {
        self.bindings.push(SelectBinding::From { alias, source });
        self
    }

    pub fn join(mut self, kind: JoinKind, alias: Ident, source: Query, on: Expr) -> Self {
        self.bindings.push(SelectBinding::Join {
            kind,
            alias,
            source,
            on,
        });
        self
    }

    pub fn filter(mut self, by: Expr) -> Self {
        self.where_ = Some(by);
        self
    }

    pub fn group_by(mut self, by: Expr) -> Self {
        self.group_by = Some(by);
        self
    }

    pub fn sort_by(mut self, by: Expr, ordering: Ordering) -> Self {
        self.sort_by = Some((by, ordering));
        self
    }

    /// Wrap as a query node
    pub fn into_query(self) -> Query {
        Query::Custom(CustomQueryRef::new(self))
    }
}

fn unit_step(marker: Query, tail: Query) -> Query {
    Query::FlatMap {
        source: Box::new(marker),
        alias: Ident::unit(),
        body: Box::new(tail),
    }
}

impl CustomQuery for SelectClause {
    fn name(&self) -> &str {
        "select"
    }

    fn tpe(&self) -> XrType {
        self.select.tpe()
    }

    fn lower(&self, position: QueryPosition) -> CompileResult<Query> {
        match self.bindings.first() {
            Some(SelectBinding::From { .. }) => {}
            Some(SelectBinding::Join { alias, .. }) => {
                return Err(CompileError::invariant(
                    "desugar",
                    format!("select clause starts with a join on '{alias}'"),
                    self.select.clone(),
                ))
            }
            None => {
                return Err(CompileError::invariant(
                    "desugar",
                    "select clause has no FROM source",
                    self.select.clone(),
                ))
            }
        }

        let mut tail = Query::ExprAsQuery {
            expr: self.select.clone(),
        };
        if let Some((by, ordering)) = &self.sort_by {
            tail = unit_step(
                Query::FlatSortBy {
                    by: by.clone(),
                    ordering: ordering.clone(),
                },
                tail,
            );
        }
        if let Some(by) = &self.group_by {
            tail = unit_step(Query::FlatGroupBy { by: by.clone() }, tail);
        }
        if let Some(by) = &self.where_ {
            tail = unit_step(Query::FlatFilter { by: by.clone() }, tail);
        }
        for binding in self.bindings.iter().rev() {
            tail = match binding {
                SelectBinding::From { alias, source } => Query::FlatMap {
                    source: Box::new(source.clone()),
                    alias: alias.clone(),
                    body: Box::new(tail),
                },
                SelectBinding::Join {
                    kind,
                    alias,
                    source,
                    on,
                } => Query::FlatMap {
                    source: Box::new(Query::FlatJoin {
                        kind: *kind,
                        source: Box::new(source.clone()),
                        alias: alias.clone(),
                        on: on.clone(),
                    }),
                    alias: alias.clone(),
                    body: Box::new(tail),
                },
            };
        }

        let needs_boundary = self.group_by.is_some() || self.sort_by.is_some();
        if position == QueryPosition::Nested && needs_boundary {
            Ok(Query::Nested {
                source: Box::new(tail),
            })
        } else {
            Ok(tail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_lower_from_where_select() {
        let p = ident("p");
        let clause = SelectClause::new(prop(&p, "name"))
            .from(p.clone(), person_entity())
            .filter(gt(prop(&p, "age"), Expr::int(18)));
        let lowered = clause.lower(QueryPosition::Outermost).unwrap();
        assert_eq!(
            lowered.to_string(),
            "query[Person].flatMap(p => sql.filter((p.age > 18)).flatMap(unused => p.name))"
        );
    }

    #[test]
    fn test_nested_position_adds_boundary_for_sorting() {
        let p = ident("p");
        let clause = SelectClause::new(prop(&p, "name"))
            .from(p.clone(), person_entity())
            .sort_by(prop(&p, "age"), Ordering::Asc);
        assert!(matches!(
            clause.lower(QueryPosition::Nested).unwrap(),
            Query::Nested { .. }
        ));
        assert!(matches!(
            clause.lower(QueryPosition::Outermost).unwrap(),
            Query::FlatMap { .. }
        ));
    }

    #[test]
    fn test_join_first_is_rejected() {
        let p = ident("p");
        let clause = SelectClause::new(prop(&p, "name")).join(
            JoinKind::Inner,
            p.clone(),
            person_entity(),
            Expr::boolean(true),
        );
        let err = clause.lower(QueryPosition::Outermost).unwrap_err();
        assert!(matches!(err, CompileError::InvariantViolation { .. }));
    }
}
