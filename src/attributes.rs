//! Feature attribute values and grouping keys
//!
//! GeoJSON properties are free-form. They are narrowed to the closed
//! [`AttrValue`] type so that grouping keys can be hashed and compared by value,
//! with `null` forming a group of its own.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Ordered attribute table of one feature (insertion order of the source file)
pub type AttributeTable = IndexMap<String, AttrValue>;

/// A single attribute value
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl AttrValue {
    /// Convert a JSON value. Arrays and objects are kept as their JSON text.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Value::String(s) => Self::Str(s.clone()),
            other => Self::Str(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    // -0.0 and 0.0 are one group, and so are all NaNs.
    fn number_bits(n: f64) -> u64 {
        if n == 0.0 {
            0.0_f64.to_bits()
        } else if n.is_nan() {
            f64::NAN.to_bits()
        } else {
            n.to_bits()
        }
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => Self::number_bits(*a) == Self::number_bits(*b),
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttrValue {}

impl Hash for AttrValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Number(n) => Self::number_bits(*n).hash(state),
            Self::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Composite grouping key: one value per grouping attribute, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct GroupKey(Vec<AttrValue>);

impl GroupKey {
    #[must_use]
    pub fn new(values: Vec<AttrValue>) -> Self {
        Self(values)
    }

    /// Key used outside group-by mode
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build the key of `attributes` for the given attribute names.
    /// Absent attributes contribute [`AttrValue::Null`].
    #[must_use]
    pub fn from_attributes(attributes: &AttributeTable, names: &[String]) -> Self {
        Self(
            names
                .iter()
                .map(|name| attributes.get(name).cloned().unwrap_or(AttrValue::Null))
                .collect(),
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[AttrValue] {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<all>");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|v| match v {
                AttrValue::Null => "null".to_string(),
                other => other.to_string(),
            })
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}
