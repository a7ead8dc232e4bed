//! Structural type lattice for XR nodes

use std::fmt;

/// Structural type tag carried by every XR node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum XrType {
    /// Opaque scalar
    Value,
    /// A boolean stored or selected as a value (a column)
    BooleanValue,
    /// A boolean in predicate position (WHERE, ON, WHEN)
    BooleanExpression,
    /// Structured row with ordered named fields
    Product(ProductType),
    /// Type not known to the front end
    Unknown,
    /// Type parameter not yet resolved
    Generic,
    /// The type of the `null` literal
    Null,
}

/// A named product type with fields in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductType {
    /// Type name (table or case-class name)
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<(String, XrType)>,
}

impl ProductType {
    /// Create a product type
    pub fn new(name: impl Into<String>, fields: Vec<(String, XrType)>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Product type whose fields are all opaque scalars
    pub fn of_values(name: impl Into<String>, fields: &[&str]) -> Self {
        Self::new(
            name,
            fields
                .iter()
                .map(|f| (f.to_string(), XrType::Value))
                .collect(),
        )
    }

    /// Look up a field type by name
    pub fn field(&self, name: &str) -> Option<&XrType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Field names in declaration order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    fn least_upper(&self, other: &ProductType) -> Option<ProductType> {
        if self.name != other.name {
            return None;
        }
        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, tpe) in &self.fields {
            let joined = match other.field(name) {
                Some(theirs) => tpe.least_upper_type(theirs)?,
                None => tpe.clone(),
            };
            fields.push((name.clone(), joined));
        }
        for (name, tpe) in &other.fields {
            if self.field(name).is_none() {
                fields.push((name.clone(), tpe.clone()));
            }
        }
        Some(ProductType {
            name: self.name.clone(),
            fields,
        })
    }
}

impl XrType {
    /// Partial join of two types.
    ///
    /// `Unknown`, `Generic` and `Null` absorb into the other side,
    /// `BooleanValue` joined with `BooleanExpression` is `BooleanValue`, and
    /// products join field by field when their names agree. Everything else
    /// has no upper bound and returns `None`.
    pub fn least_upper_type(&self, other: &XrType) -> Option<XrType> {
        use XrType::*;
        match (self, other) {
            (Unknown | Generic | Null, t) | (t, Unknown | Generic | Null) => Some(t.clone()),
            (BooleanValue, BooleanExpression) | (BooleanExpression, BooleanValue) => {
                Some(BooleanValue)
            }
            (Product(a), Product(b)) => a.least_upper(b).map(Product),
            (a, b) if a == b => Some(a.clone()),
            _ => None,
        }
    }

    /// Returns true for both boolean flavours
    pub fn is_boolean(&self) -> bool {
        matches!(self, XrType::BooleanValue | XrType::BooleanExpression)
    }

    /// Returns true if this is a product type
    pub fn is_product(&self) -> bool {
        matches!(self, XrType::Product(_))
    }

    /// Borrow the product type, if any
    pub fn as_product(&self) -> Option<&ProductType> {
        match self {
            XrType::Product(p) => Some(p),
            _ => None,
        }
    }

    /// Returns true for the absorbing elements of the lattice
    pub fn is_unresolved(&self) -> bool {
        matches!(self, XrType::Unknown | XrType::Generic)
    }

    /// Leaf paths of this type in declaration order.
    ///
    /// A scalar yields a single empty path; a product yields one path per
    /// non-product field, recursing into nested products.
    pub fn leaf_paths(&self) -> Vec<(Vec<String>, XrType)> {
        match self {
            XrType::Product(p) => p
                .fields
                .iter()
                .flat_map(|(name, tpe)| {
                    tpe.leaf_paths().into_iter().map(move |(mut path, leaf)| {
                        path.insert(0, name.clone());
                        (path, leaf)
                    })
                })
                .collect(),
            other => vec![(Vec::new(), other.clone())],
        }
    }
}

impl fmt::Display for XrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XrType::Value => write!(f, "Value"),
            XrType::BooleanValue => write!(f, "BooleanValue"),
            XrType::BooleanExpression => write!(f, "BooleanExpression"),
            XrType::Product(p) => {
                write!(f, "{}(", p.name)?;
                for (i, (name, tpe)) in p.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {tpe}")?;
                }
                write!(f, ")")
            }
            XrType::Unknown => write!(f, "Unknown"),
            XrType::Generic => write!(f, "Generic"),
            XrType::Null => write!(f, "Null"),
        }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
