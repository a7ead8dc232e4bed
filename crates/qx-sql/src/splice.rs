//! Resolution of front-end tagged sub-trees
//!
//! A front end may leave `TagForSqlExpr` / `TagForSqlQuery` placeholders in
//! the tree and hand over their contents separately. Splicing replaces every
//! tag before normalization; spliced trees may carry further tags.

use qx_core::error::{CompileError, CompileResult};
use qx_core::xr::visit::{walk_expr, walk_query};
use qx_core::xr::{Action, Expr, Query, Rewrite};
use std::collections::HashMap;
use std::fmt::Display;

/// Tags nested deeper than this are treated as a cycle
const MAX_SPLICE_DEPTH: usize = 32;

/// Tagged sub-trees keyed by binding id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpliceMap {
    exprs: HashMap<String, Expr>,
    queries: HashMap<String, Query>,
}

impl SpliceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expr(mut self, bid: impl Into<String>, e: Expr) -> Self {
        self.exprs.insert(bid.into(), e);
        self
    }

    pub fn with_query(mut self, bid: impl Into<String>, q: Query) -> Self {
        self.queries.insert(bid.into(), q);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty() && self.queries.is_empty()
    }

    pub fn splice_query(&self, q: &Query) -> CompileResult<Query> {
        Splicer::new(self).rewrite_query(q)
    }

    pub fn splice_expr(&self, e: &Expr) -> CompileResult<Expr> {
        Splicer::new(self).rewrite_expr(e)
    }

    pub fn splice_action(&self, a: &Action) -> CompileResult<Action> {
        Splicer::new(self).rewrite_action(a)
    }
}

struct Splicer<'m> {
    map: &'m SpliceMap,
    depth: usize,
}

impl<'m> Splicer<'m> {
    fn new(map: &'m SpliceMap) -> Self {
        Self { map, depth: 0 }
    }

    /// Rewrite a spliced tree one level deeper
    fn descend<T: Display, R>(
        &mut self,
        bid: &str,
        tree: &T,
        f: impl FnOnce(&mut Self, &T) -> CompileResult<R>,
    ) -> CompileResult<R> {
        if self.depth >= MAX_SPLICE_DEPTH {
            return Err(CompileError::invariant(
                "splice",
                format!("tag {bid} nests more than {MAX_SPLICE_DEPTH} splices"),
                tree,
            ));
        }
        log::debug!("Splicing {bid}");
        self.depth += 1;
        let out = f(self, tree);
        self.depth -= 1;
        out
    }
}

impl Rewrite for Splicer<'_> {
    fn rewrite_query(&mut self, q: &Query) -> CompileResult<Query> {
        match q {
            Query::TagForSqlQuery { bid, .. } => {
                let map = self.map;
                let found = map
                    .queries
                    .get(bid)
                    .ok_or_else(|| CompileError::MissingSplice { bid: bid.clone() })?;
                self.descend(bid, found, |s, t| s.rewrite_query(t))
            }
            _ => walk_query(self, q),
        }
    }

    fn rewrite_expr(&mut self, e: &Expr) -> CompileResult<Expr> {
        match e {
            Expr::TagForSqlExpr { bid, .. } => {
                let map = self.map;
                let found = map
                    .exprs
                    .get(bid)
                    .ok_or_else(|| CompileError::MissingSplice { bid: bid.clone() })?;
                self.descend(bid, found, |s, t| s.rewrite_expr(t))
            }
            _ => walk_expr(self, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qx_core::test_utils::*;
    use qx_core::xr::XrType;

    fn tag(bid: &str) -> Expr {
        Expr::TagForSqlExpr {
            bid: bid.into(),
            tpe: XrType::Value,
        }
    }

    #[test]
    fn test_splice_expr_inside_query() {
        let p = person_ident("p");
        let q = person_entity().filter(p.clone(), gt(prop(&p, "age"), tag("min")));
        let map = SpliceMap::new().with_expr("min", Expr::int(18));
        let expected = person_entity().filter(p.clone(), gt(prop(&p, "age"), Expr::int(18)));
        assert_eq!(map.splice_query(&q).unwrap(), expected);
    }

    #[test]
    fn test_splice_query_tag() {
        let q = Query::TagForSqlQuery {
            bid: "people".into(),
            tpe: XrType::Product(person_type()),
        }
        .take(Expr::int(1));
        let map = SpliceMap::new().with_query("people", person_entity());
        assert_eq!(
            map.splice_query(&q).unwrap(),
            person_entity().take(Expr::int(1))
        );
    }

    #[test]
    fn test_nested_tags_resolved() {
        let map = SpliceMap::new()
            .with_expr("outer", plus(tag("inner"), Expr::int(1)))
            .with_expr("inner", Expr::int(2));
        assert_eq!(
            map.splice_expr(&tag("outer")).unwrap(),
            plus(Expr::int(2), Expr::int(1))
        );
    }

    #[test]
    fn test_missing_tag() {
        let err = SpliceMap::new().splice_expr(&tag("nope")).unwrap_err();
        assert_eq!(err, CompileError::MissingSplice { bid: "nope".into() });
    }

    #[test]
    fn test_self_referencing_tag_is_cut_off() {
        let map = SpliceMap::new().with_expr("loop", plus(tag("loop"), Expr::int(1)));
        let err = map.splice_expr(&tag("loop")).unwrap_err();
        assert!(matches!(err, CompileError::InvariantViolation { .. }));
    }

    #[test]
    fn test_empty_map_leaves_untagged_tree() {
        let map = SpliceMap::new();
        assert!(map.is_empty());
        let e = plus(Expr::int(1), Expr::int(2));
        assert_eq!(map.splice_expr(&e).unwrap(), e);
    }
}
