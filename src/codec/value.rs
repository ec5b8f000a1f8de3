//! Decoded value model.
//!
//! A decoded property value is an ordered sequence of records, one per
//! format tuple; each record is an ordered sequence of scalars. 64-bit
//! codes keep their full width here; nothing is squeezed through `f64`
//! on the way in or out.

use std::fmt;

/// One leaf of a decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Scalar {
    /// Numeric view for range checks; strings and booleans are opted out.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Uint(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Str(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Uint(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Bool(v) => serde_json::Value::from(*v),
            Self::Str(v) => serde_json::Value::from(v.clone()),
        }
    }

    /// Map a JSON leaf back to a scalar; arrays and objects map to `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Some(Self::Uint(v))
                } else if let Some(v) = n.as_i64() {
                    Some(Self::Int(v))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            serde_json::Value::Bool(v) => Some(Self::Bool(*v)),
            serde_json::Value::String(v) => Some(Self::Str(v.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
        }
    }
}

/// One format tuple's worth of scalars.
pub type Record = Vec<Scalar>;

/// A full decoded property value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedValue {
    pub records: Vec<Record>,
}

impl DecodedValue {
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// All scalars in record order, records concatenated.
    pub fn flattened(&self) -> impl Iterator<Item = &Scalar> {
        self.records.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
