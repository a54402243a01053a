use std::borrow::Cow;
use std::fmt;

use derive_more::From;

use crate::errors::{RegistryError, RegistryResult};

/// A value accepted by the match methods: text, integer, or boolean.
///
/// Registry queries are inherently text-based, so integers and booleans are
/// converted to their canonical text form before storage and the constraint
/// composes uniformly with every other one. Value kinds outside this set are
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, From)]
pub enum MatchValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl MatchValue {
    /// The canonical text form, as stored in the registry: integers in
    /// decimal, booleans as `"1"`/`"0"`.
    pub fn canonical(&self) -> Cow<'_, str> {
        match self {
            MatchValue::Text(text) => Cow::Borrowed(text.as_str()),
            MatchValue::Int(value) => Cow::Owned(value.to_string()),
            MatchValue::Bool(true) => Cow::Borrowed("1"),
            MatchValue::Bool(false) => Cow::Borrowed("0"),
        }
    }

    /// Inverse of [`canonical`](Self::canonical) for integers, used by the
    /// typed device accessors.
    pub fn parse_int(text: &str) -> RegistryResult<i64> {
        text.trim().parse().map_err(|_| {
            RegistryError::InvalidValueType {
                value: text.to_string(),
                wanted: "an integer",
            }
            .into()
        })
    }

    /// Inverse of [`canonical`](Self::canonical) for booleans.
    pub fn parse_bool(text: &str) -> RegistryResult<bool> {
        match text.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(RegistryError::InvalidValueType {
                value: other.to_string(),
                wanted: "a boolean (\"1\" or \"0\")",
            }
            .into()),
        }
    }
}

impl From<&str> for MatchValue {
    fn from(value: &str) -> Self {
        MatchValue::Text(value.to_string())
    }
}

impl From<i32> for MatchValue {
    fn from(value: i32) -> Self {
        MatchValue::Int(value.into())
    }
}

impl fmt::Display for MatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}
