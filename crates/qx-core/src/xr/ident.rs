//! Identifiers bound by query combinators

use super::types::XrType;
use std::hash::{Hash, Hasher};

/// Whether an identifier is rendered as a qualifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// Written by the user and rendered normally
    #[default]
    Visible,
    /// Synthetic, introduced by desugaring or flattening; never rendered as a qualifier
    Hidden,
}

/// Source position of a node, if the front end recorded one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    /// 1-based line, 0 when unknown
    pub line: u32,
    /// 1-based column, 0 when unknown
    pub column: u32,
}

impl Location {
    /// Location for nodes with no recorded position
    pub const UNKNOWN: Location = Location { line: 0, column: 0 };

    /// Create a location
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A bound or free identifier.
///
/// Equality and hashing use only the name. Type, visibility and location are
/// metadata: two occurrences of the same variable compare equal even when one
/// of them has been retyped.
#[derive(Debug, Clone)]
pub struct Ident {
    /// Variable name
    pub name: String,
    /// Declared type
    pub tpe: XrType,
    /// Rendering visibility
    pub visibility: Visibility,
    /// Source position
    pub loc: Location,
}

impl Ident {
    /// A visible identifier
    pub fn new(name: impl Into<String>, tpe: XrType) -> Self {
        Self {
            name: name.into(),
            tpe,
            visibility: Visibility::Visible,
            loc: Location::UNKNOWN,
        }
    }

    /// A synthetic identifier
    pub fn hidden(name: impl Into<String>, tpe: XrType) -> Self {
        Self {
            name: name.into(),
            tpe,
            visibility: Visibility::Hidden,
            loc: Location::UNKNOWN,
        }
    }

    /// The placeholder bound by flat-unit markers
    pub fn unit() -> Self {
        Self::hidden("unused", XrType::Unknown)
    }

    /// Same identifier with a new type
    pub fn with_type(&self, tpe: XrType) -> Self {
        Self {
            tpe,
            ..self.clone()
        }
    }

    /// Same identifier with a new name
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Same identifier with a recorded position
    pub fn at(mut self, loc: Location) -> Self {
        self.loc = loc;
        self
    }

    /// Returns true for synthetic identifiers
    pub fn is_hidden(&self) -> bool {
        self.visibility == Visibility::Hidden
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Ident {}

impl Hash for Ident {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
