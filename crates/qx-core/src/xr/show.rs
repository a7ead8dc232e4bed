//! Compact textual form of XR trees, used in error messages and traces

use super::action::{Action, Assignment, ConflictResolution, ConflictTarget};
use super::expr::{Constant, Expr, UnaryOperator};
use super::query::Query;
use std::fmt::{self, Display, Formatter};

fn list<T: Display>(f: &mut Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Double(v) => write!(f, "{v:?}"),
            Constant::String(v) => write!(f, "\"{v}\""),
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::Null => write!(f, "null"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BinaryOp { a, op, b } => write!(f, "({a} {op} {b})"),
            Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::IsEmpty | UnaryOperator::NonEmpty => write!(f, "{expr}.{op}"),
                _ => write!(f, "{op}{expr}"),
            },
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Ident(id) => write!(f, "{}", id.name),
            Expr::Property { of, name, .. } => write!(f, "{of}.{name}"),
            Expr::Product { name, fields } => {
                write!(f, "{name}(")?;
                for (i, (n, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{n}: {v}")?;
                }
                write!(f, ")")
            }
            Expr::When { branches, or_else } => {
                for (i, br) in branches.iter().enumerate() {
                    if i > 0 {
                        write!(f, " else ")?;
                    }
                    write!(f, "if ({}) {}", br.cond, br.then)?;
                }
                write!(f, " else {or_else}")
            }
            Expr::MethodCall {
                head, name, args, ..
            } => {
                write!(f, "{head}.{name}(")?;
                list(f, args)?;
                write!(f, ")")
            }
            Expr::GlobalCall { name, args, .. } => {
                write!(f, "{name}(")?;
                list(f, args)?;
                write!(f, ")")
            }
            Expr::QueryAsExpr(q) => write!(f, "{q}"),
            Expr::Function { params, body } => {
                write!(f, "(")?;
                list(f, params)?;
                write!(f, ") => {body}")
            }
            Expr::FunctionApply { function, args } => {
                write!(f, "{function}.apply(")?;
                list(f, args)?;
                write!(f, ")")
            }
            Expr::Block { bindings, output } => {
                write!(f, "{{ ")?;
                for (id, v) in bindings {
                    write!(f, "val {id} = {v}; ")?;
                }
                write!(f, "{output} }}")
            }
            Expr::Param { bid, kind, .. } => write!(f, "lift[{kind}]({bid})"),
            Expr::TagForSqlExpr { bid, .. } => write!(f, "tag({bid})"),
        }
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Query::Entity { name, .. } => write!(f, "query[{name}]"),
            Query::Filter {
                source,
                alias,
                body,
            } => write!(f, "{source}.filter({alias} => {body})"),
            Query::Map {
                source,
                alias,
                body,
            } => write!(f, "{source}.map({alias} => {body})"),
            Query::FlatMap {
                source,
                alias,
                body,
            } => write!(f, "{source}.flatMap({alias} => {body})"),
            Query::ConcatMap {
                source,
                alias,
                body,
            } => write!(f, "{source}.concatMap({alias} => {body})"),
            Query::SortBy {
                source,
                alias,
                criteria,
                ordering,
            } => write!(f, "{source}.sortBy({alias} => {criteria})({ordering})"),
            Query::GroupByMap {
                source,
                by_alias,
                by,
                map_alias,
                map,
            } => write!(
                f,
                "{source}.groupByMap({by_alias} => {by})({map_alias} => {map})"
            ),
            Query::Take { source, count } => write!(f, "{source}.take({count})"),
            Query::Drop { source, count } => write!(f, "{source}.drop({count})"),
            Query::Distinct { source } => write!(f, "{source}.distinct"),
            Query::DistinctOn { source, alias, by } => {
                write!(f, "{source}.distinctOn({alias} => {by})")
            }
            Query::Nested { source } => write!(f, "{source}.nested"),
            Query::Union { a, b } => write!(f, "{a}.union({b})"),
            Query::UnionAll { a, b } => write!(f, "{a}.unionAll({b})"),
            Query::FlatJoin {
                kind,
                source,
                alias,
                on,
            } => write!(f, "{kind}Join({source}).on({alias} => {on})"),
            Query::FlatFilter { by } => write!(f, "sql.filter({by})"),
            Query::FlatGroupBy { by } => write!(f, "sql.groupBy({by})"),
            Query::FlatSortBy { by, ordering } => write!(f, "sql.sortBy({by})({ordering})"),
            Query::ExprAsQuery { expr } => write!(f, "{expr}"),
            Query::TagForSqlQuery { bid, .. } => write!(f, "tag({bid})"),
            Query::Custom(c) => write!(f, "custom[{}]", c.0.name()),
        }
    }
}

impl Display for Assignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {} -> {}", self.alias, self.property, self.value)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Action::Insert {
                entity,
                assignments,
            } => {
                write!(f, "{entity}.insert(")?;
                list(f, assignments)?;
                write!(f, ")")
            }
            Action::Update {
                entity,
                assignments,
            } => {
                write!(f, "{entity}.update(")?;
                list(f, assignments)?;
                write!(f, ")")
            }
            Action::Delete { entity } => write!(f, "{entity}.delete"),
            Action::FilteredAction {
                action,
                alias,
                filter,
            } => write!(f, "{action}.where({alias} => {filter})"),
            Action::OnConflict {
                insert,
                target,
                resolution,
            } => {
                write!(f, "{insert}.onConflict(")?;
                if let ConflictTarget::Properties(props) = target {
                    list(f, props)?;
                }
                match resolution {
                    ConflictResolution::Ignore => write!(f, ").ignore"),
                    ConflictResolution::Update {
                        existing,
                        excluded,
                        assignments,
                    } => {
                        write!(f, ").update(({existing}, {excluded}) => ")?;
                        list(f, assignments)?;
                        write!(f, ")")
                    }
                }
            }
            Action::Returning {
                action,
                alias,
                output,
            } => write!(f, "{action}.returning({alias} => {output})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::*;
    use crate::xr::Expr;

    #[test]
    fn test_display_filter_map() {
        let p = ident("p");
        let q = person_entity()
            .filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)))
            .map(p.clone(), prop(&p, "name"));
        assert_eq!(
            q.to_string(),
            "query[Person].filter(p => (p.age > 18)).map(p => p.name)"
        );
    }
}
