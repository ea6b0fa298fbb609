//! Row keys of distributed matrices.
//!
//! Only `Int`-keyed matrices have row keys that double as row indices, so
//! only they can be physically transposed or sliced by row range.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Int,
    Long,
    Text,
}

impl KeyType {
    pub fn is_int(self) -> bool {
        matches!(self, KeyType::Int)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyType::Int => "int",
            KeyType::Long => "long",
            KeyType::Text => "text",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RowKey {
    Int(i32),
    Long(i64),
    Text(String),
}

impl RowKey {
    pub fn key_type(&self) -> KeyType {
        match self {
            RowKey::Int(_) => KeyType::Int,
            RowKey::Long(_) => KeyType::Long,
            RowKey::Text(_) => KeyType::Text,
        }
    }

    /// Row index for `Int` keys.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            RowKey::Int(i) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }
}

impl From<i32> for RowKey {
    fn from(v: i32) -> Self {
        RowKey::Int(v)
    }
}

impl From<i64> for RowKey {
    fn from(v: i64) -> Self {
        RowKey::Long(v)
    }
}

impl From<&str> for RowKey {
    fn from(v: &str) -> Self {
        RowKey::Text(v.to_string())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Int(v) => write!(f, "{v}"),
            RowKey::Long(v) => write!(f, "{v}L"),
            RowKey::Text(v) => write!(f, "{v:?}"),
        }
    }
}
