//! Action family of the XR tree (INSERT / UPDATE / DELETE)

use super::expr::Expr;
use super::ident::Ident;
use super::query::Query;
use super::types::ProductType;

/// `alias => property := value`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Row identifier the property is resolved against
    pub alias: Ident,
    /// Target column, a property of `alias`
    pub property: Expr,
    /// New value; may reference `alias`
    pub value: Expr,
}

/// Columns that identify a conflicting row
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictTarget {
    /// Whatever unique constraint the database reports
    Unspecified,
    /// Explicit conflict columns, properties of the inserted row
    Properties(Vec<Expr>),
}

/// What to do with a conflicting row
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictResolution {
    /// Keep the existing row
    Ignore,
    /// Update the existing row. Assignment values may reference both the
    /// existing row and the row that failed to insert.
    Update {
        existing: Ident,
        excluded: Ident,
        assignments: Vec<Assignment>,
    },
}

/// XR action
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// INSERT INTO entity (cols) VALUES (values)
    Insert {
        entity: Query,
        assignments: Vec<Assignment>,
    },
    /// UPDATE entity SET ...
    Update {
        entity: Query,
        assignments: Vec<Assignment>,
    },
    /// DELETE FROM entity
    Delete { entity: Query },
    /// An update or delete restricted by a predicate over the target row
    FilteredAction {
        action: Box<Action>,
        alias: Ident,
        filter: Expr,
    },
    /// INSERT with conflict handling
    OnConflict {
        insert: Box<Action>,
        target: ConflictTarget,
        resolution: ConflictResolution,
    },
    /// Return generated values from the affected rows
    Returning {
        action: Box<Action>,
        alias: Ident,
        output: Expr,
    },
}

impl Action {
    /// The target table of the action
    pub fn entity(&self) -> &Query {
        match self {
            Action::Insert { entity, .. }
            | Action::Update { entity, .. }
            | Action::Delete { entity } => entity,
            Action::FilteredAction { action, .. }
            | Action::Returning { action, .. }
            | Action::OnConflict {
                insert: action, ..
            } => action.entity(),
        }
    }

    /// Name and row type of the target table, if it is a plain entity
    pub fn table(&self) -> Option<(&str, &ProductType)> {
        match self.entity() {
            Query::Entity { name, tpe } => Some((name, tpe)),
            _ => None,
        }
    }
}
