//! INSERT / UPDATE / DELETE

use super::{Qualifier, Tokenizer};
use crate::dialect::{ActionAlias, ReturningStyle, UpsertStyle};
use crate::model::leaves;
use crate::token::Token;
use qx_core::error::{CompileError, CompileResult};
use qx_core::trace::TraceType;
use qx_core::xr::{Action, Assignment, ConflictResolution, ConflictTarget, Expr, Ident};

/// A rendered action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTokens {
    pub token: Token,
    /// Names of the values the statement hands back, in order. Filled for
    /// every returning style, including drivers reading generated keys.
    pub returning: Vec<String>,
}

/// Returned-value clauses, split by where they land in the statement
#[derive(Default)]
struct ReturnClauses {
    /// `OUTPUT ...`, before VALUES / WHERE
    output: Option<Token>,
    /// `RETURNING ...`, at the end
    trailing: Option<Token>,
    names: Vec<String>,
}

/// Column name of `alias.a.b`, if `e` is a property path of `alias`
fn column_of(alias: &Ident, e: &Expr) -> Option<String> {
    match e.property_path() {
        (Expr::Ident(root), path) if root == alias && !path.is_empty() => Some(path.join("_")),
        _ => None,
    }
}

fn is_delete(a: &Action) -> bool {
    match a {
        Action::Delete { .. } => true,
        Action::FilteredAction { action, .. } => is_delete(action),
        _ => false,
    }
}

impl Tokenizer<'_, '_> {
    /// Render an action
    pub fn tokenize_action(&mut self, a: &Action) -> CompileResult<ActionTokens> {
        let (core, returning) = match a {
            Action::Returning {
                action,
                alias,
                output,
            } => (action.as_ref(), Some((alias, output))),
            other => (other, None),
        };
        let Some((table, _)) = a.table() else {
            return Err(CompileError::unsupported(
                self.dialect.name(),
                "write to a non-entity target",
                a,
            ));
        };
        let table = self.dialect.escape_ident(table);

        let clauses = match returning {
            Some((alias, output)) => self.returning(alias, output, is_delete(core), a)?,
            None => ReturnClauses::default(),
        };

        let mut parts = match core {
            Action::Insert { assignments, .. } => {
                self.insert(&table, assignments, false, clauses.output)?
            }
            Action::OnConflict {
                insert,
                target,
                resolution,
            } => {
                let Action::Insert { assignments, .. } = insert.as_ref() else {
                    return Err(CompileError::invariant(
                        "tokenize",
                        "conflict handling on a non-insert action",
                        a,
                    ));
                };
                self.upsert(&table, assignments, target, resolution, clauses.output, a)?
            }
            Action::Update { assignments, .. } => {
                self.update(&table, assignments, None, clauses.output)?
            }
            Action::Delete { .. } => self.delete(&table, None, clauses.output)?,
            Action::FilteredAction {
                action,
                alias,
                filter,
            } => match action.as_ref() {
                Action::Update { assignments, .. } => {
                    self.update(&table, assignments, Some((alias, filter)), clauses.output)?
                }
                Action::Delete { .. } => {
                    self.delete(&table, Some((alias, filter)), clauses.output)?
                }
                _ => {
                    return Err(CompileError::unsupported(
                        self.dialect.name(),
                        "filter on an insert",
                        a,
                    ))
                }
            },
            Action::Returning { .. } => {
                return Err(CompileError::invariant(
                    "tokenize",
                    "nested returning clause",
                    a,
                ))
            }
        };
        parts.extend(clauses.trailing);

        Ok(ActionTokens {
            token: Token::spaced(parts),
            returning: clauses.names,
        })
    }

    fn returning(
        &mut self,
        alias: &Ident,
        output: &Expr,
        deleted: bool,
        a: &Action,
    ) -> CompileResult<ReturnClauses> {
        let found = leaves(output);
        let names: Vec<String> = found
            .iter()
            .map(|(path, e)| {
                column_of(alias, e).unwrap_or_else(|| {
                    if path.is_empty() {
                        "value".to_string()
                    } else {
                        path.join("_")
                    }
                })
            })
            .collect();
        let items: Vec<Expr> = found.into_iter().map(|(_, e)| e).collect();

        match self.dialect.returning() {
            ReturningStyle::Returning => {
                let list = self.qualified(vec![(alias, Qualifier::Bare)], |t| t.expr_list(&items))?;
                Ok(ReturnClauses {
                    trailing: Some(Token::spaced(vec![Token::lit("RETURNING"), list])),
                    names,
                    ..ReturnClauses::default()
                })
            }
            ReturningStyle::Output => {
                let pseudo = if deleted { "DELETED" } else { "INSERTED" };
                let list = self.qualified(
                    vec![(alias, Qualifier::Named(pseudo.to_string()))],
                    |t| t.expr_list(&items),
                )?;
                Ok(ReturnClauses {
                    output: Some(Token::spaced(vec![Token::lit("OUTPUT"), list])),
                    names,
                    ..ReturnClauses::default()
                })
            }
            ReturningStyle::GeneratedKeys => {
                if items.iter().any(|e| column_of(alias, e).is_none()) {
                    return Err(CompileError::unsupported(
                        self.dialect.name(),
                        "returning a computed value",
                        a,
                    ));
                }
                Ok(ReturnClauses {
                    names,
                    ..ReturnClauses::default()
                })
            }
        }
    }

    /// Unqualified column an assignment writes to
    fn target_column(&self, assignment: &Assignment) -> CompileResult<String> {
        column_of(&assignment.alias, &assignment.property)
            .map(|c| self.dialect.escape_ident(&c))
            .ok_or_else(|| {
                CompileError::invariant(
                    "tokenize",
                    "assignment target is not a column",
                    &assignment.property,
                )
            })
    }

    fn insert(
        &mut self,
        table: &str,
        assignments: &[Assignment],
        ignore: bool,
        output: Option<Token>,
    ) -> CompileResult<Vec<Token>> {
        let columns = assignments
            .iter()
            .map(|a| self.target_column(a).map(Token::lit))
            .collect::<CompileResult<Vec<_>>>()?;
        let values: Vec<Expr> = assignments.iter().map(|a| a.value.clone()).collect();
        let values = self.expr_list(&values)?;

        let keyword = if ignore {
            "INSERT IGNORE INTO"
        } else {
            "INSERT INTO"
        };
        let mut parts = vec![
            Token::lit(keyword),
            Token::lit(table),
            Token::parens(Token::join(columns, ", ")),
        ];
        parts.extend(output);
        parts.push(Token::lit("VALUES"));
        parts.push(Token::Context(Box::new(Token::parens(values))));
        Ok(parts)
    }

    /// `col = value, ...` with the assigned rows resolved through `qualifier`
    fn set_list<'a>(
        &mut self,
        assignments: &'a [Assignment],
        extra: Vec<(&'a Ident, Qualifier)>,
        qualifier: Qualifier,
    ) -> CompileResult<Token> {
        let mut bindings = extra;
        for a in assignments {
            if !bindings.iter().any(|(id, _)| *id == &a.alias) {
                bindings.push((&a.alias, qualifier.clone()));
            }
        }
        self.qualified(bindings, |t| {
            let mut items = Vec::with_capacity(assignments.len());
            for a in assignments {
                items.push(Token::spaced(vec![
                    Token::lit(t.target_column(a)?),
                    Token::lit("="),
                    t.tokenize_expr(&a.value)?,
                ]));
            }
            Ok(Token::join(items, ", "))
        })
    }

    fn upsert(
        &mut self,
        table: &str,
        assignments: &[Assignment],
        target: &ConflictTarget,
        resolution: &ConflictResolution,
        output: Option<Token>,
        a: &Action,
    ) -> CompileResult<Vec<Token>> {
        match self.dialect.upsert() {
            UpsertStyle::OnConflict => {
                let mut parts = self.insert(table, assignments, false, output)?;
                parts.push(Token::lit("ON CONFLICT"));
                if let ConflictTarget::Properties(columns) = target {
                    let columns = columns
                        .iter()
                        .map(|c| self.conflict_column(c, a))
                        .collect::<CompileResult<Vec<_>>>()?;
                    parts.push(Token::parens(Token::join(columns, ", ")));
                }
                match resolution {
                    ConflictResolution::Ignore => parts.push(Token::lit("DO NOTHING")),
                    ConflictResolution::Update { .. }
                        if *target == ConflictTarget::Unspecified =>
                    {
                        return Err(CompileError::unsupported(
                            self.dialect.name(),
                            "ON CONFLICT DO UPDATE without a conflict target",
                            a,
                        ));
                    }
                    ConflictResolution::Update {
                        existing,
                        excluded,
                        assignments,
                    } => {
                        let set = self.set_list(
                            assignments,
                            vec![
                                (existing, Qualifier::Named(table.to_string())),
                                (excluded, Qualifier::Named("EXCLUDED".to_string())),
                            ],
                            Qualifier::Named(table.to_string()),
                        )?;
                        parts.push(Token::lit("DO UPDATE SET"));
                        parts.push(set);
                    }
                }
                Ok(parts)
            }
            UpsertStyle::OnDuplicateKey => {
                if let ConflictTarget::Properties(_) = target {
                    let dialect = self.dialect.name();
                    self.tracer.trace(TraceType::Warning, || {
                        format!("{dialect} resolves conflicts on any unique key; target ignored")
                    });
                }
                match resolution {
                    ConflictResolution::Ignore => self.insert(table, assignments, true, output),
                    ConflictResolution::Update {
                        existing,
                        excluded,
                        assignments: updates,
                    } => {
                        let mut parts = self.insert(table, assignments, false, output)?;
                        let set = self.set_list(
                            updates,
                            vec![(existing, Qualifier::Bare), (excluded, Qualifier::Values)],
                            Qualifier::Bare,
                        )?;
                        parts.push(Token::lit("ON DUPLICATE KEY UPDATE"));
                        parts.push(set);
                        Ok(parts)
                    }
                }
            }
            UpsertStyle::Unsupported => Err(CompileError::unsupported(
                self.dialect.name(),
                "conflict handling",
                a,
            )),
        }
    }

    fn conflict_column(&self, c: &Expr, a: &Action) -> CompileResult<Token> {
        match c.property_path() {
            (Expr::Ident(_), path) if !path.is_empty() => {
                Ok(Token::lit(self.dialect.escape_ident(&path.join("_"))))
            }
            _ => Err(CompileError::invariant(
                "tokenize",
                format!("conflict target {c} is not a column"),
                a,
            )),
        }
    }

    /// Table reference for UPDATE / DELETE and the qualifier its row alias
    /// renders through
    fn target_table(&self, table: &str, alias: Option<&Ident>) -> (Token, Qualifier) {
        let policy = self.dialect.action_alias();
        match (alias, policy) {
            (Some(alias), ActionAlias::As) => {
                let name = self.dialect.escape_ident(&alias.name);
                (
                    Token::lit(format!("{table} AS {name}")),
                    Qualifier::Named(name),
                )
            }
            (Some(alias), ActionAlias::Bare) => {
                let name = self.dialect.escape_ident(&alias.name);
                (Token::lit(format!("{table} {name}")), Qualifier::Named(name))
            }
            _ => (Token::lit(table), Qualifier::Bare),
        }
    }

    fn update(
        &mut self,
        table: &str,
        assignments: &[Assignment],
        filter: Option<(&Ident, &Expr)>,
        output: Option<Token>,
    ) -> CompileResult<Vec<Token>> {
        let row = filter.map(|(alias, _)| alias).or(assignments.first().map(|a| &a.alias));
        let (target, qualifier) = self.target_table(table, row);
        let extra = filter
            .map(|(alias, _)| vec![(alias, qualifier.clone())])
            .unwrap_or_default();
        let set = self.set_list(assignments, extra, qualifier.clone())?;

        let mut parts = vec![Token::lit("UPDATE"), target, Token::lit("SET"), set];
        parts.extend(output);
        if let Some((alias, predicate)) = filter {
            parts.push(Token::lit("WHERE"));
            parts.push(self.qualified(vec![(alias, qualifier)], |t| t.tokenize_expr(predicate))?);
        }
        Ok(parts)
    }

    fn delete(
        &mut self,
        table: &str,
        filter: Option<(&Ident, &Expr)>,
        output: Option<Token>,
    ) -> CompileResult<Vec<Token>> {
        let (target, qualifier) = self.target_table(table, filter.map(|(alias, _)| alias));
        let mut parts = vec![Token::lit("DELETE FROM"), target];
        parts.extend(output);
        if let Some((alias, predicate)) = filter {
            parts.push(Token::lit("WHERE"));
            parts.push(self.qualified(vec![(alias, qualifier)], |t| t.tokenize_expr(predicate))?);
        }
        Ok(parts)
    }
}
