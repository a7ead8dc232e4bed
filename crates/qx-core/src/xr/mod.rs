//! XR: the query/expression tree compiled to SQL
//!
//! Trees are immutable values. Every pass takes a tree by reference and
//! returns a new one.

pub mod action;
pub mod build;
pub mod collect;
pub mod expr;
pub mod ident;
pub mod query;
pub mod select_clause;
mod show;
pub mod types;
pub mod visit;

pub use action::{Action, Assignment, ConflictResolution, ConflictTarget};
pub use expr::{BinaryOperator, Branch, CallKind, Constant, Expr, ParamKind, UnaryOperator};
pub use ident::{Ident, Location, Visibility};
pub use query::{CustomQuery, CustomQueryRef, JoinKind, Ordering, Query, QueryPosition};
pub use select_clause::{SelectBinding, SelectClause};
pub use types::{ProductType, XrType};
pub use visit::{Rewrite, Visit};
