//! Dynamic column value type.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single column value as seen by the grid.
///
/// Every backend maps its native scalar types onto this enum. Floats are
/// intentionally not supported: values take part in key equality and
/// hashing, which requires a total order. Host runtimes store decimal
/// values as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (supports full i64 range).
    Integer(i64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Ordered list of values (element collections, array columns).
    Array(Vec<Value>),
}

impl Value {
    /// Rank of the variant in the total order.
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) => 2,
            Value::Text(_) => 3,
            Value::Bytes(_) => 4,
            Value::Array(_) => 5,
        }
    }

    /// Compares two values of the same kind.
    ///
    /// Returns `None` when the kinds differ. Predicate evaluation uses this
    /// so that `position < 'abc'` is simply false instead of matching by
    /// variant rank.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        if self.kind_rank() == other.kind_rank() {
            Some(self.cmp(other))
        } else {
            None
        }
    }

    /// Whether the column holds SQL null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The flag, for boolean columns.
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(flag) = self {
            Some(*flag)
        } else {
            None
        }
    }

    /// The number, for integer columns such as ids and versions.
    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(number) = self {
            Some(*number)
        } else {
            None
        }
    }

    /// The string, for text columns.
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(text) = self {
            Some(text)
        } else {
            None
        }
    }

    /// The raw bytes, for binary columns.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// The elements, for array and element-collection columns.
    pub fn as_array(&self) -> Option<&[Value]> {
        if let Value::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! integer_value {
    ($($int:ty),*) => {
        $(
            impl From<$int> for Value {
                fn from(number: $int) -> Self {
                    Value::Integer(i64::from(number))
                }
            }
        )*
    };
}

integer_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// `None` maps to null, so optional fields can be put directly.
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_within_kind() {
        assert!(Value::Integer(1) < Value::Integer(2));
        assert!(Value::from("apple") < Value::from("banana"));
        assert!(Value::Bool(false) < Value::Bool(true));
    }

    #[test]
    fn ordering_across_kinds_is_total() {
        let mut values = vec![
            Value::from("x"),
            Value::Integer(3),
            Value::Null,
            Value::Bool(true),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Integer(3),
                Value::from("x")
            ]
        );
    }

    #[test]
    fn compare_rejects_mixed_kinds() {
        assert_eq!(Value::Integer(1).compare(&Value::from("1")), None);
        assert_eq!(
            Value::Integer(1).compare(&Value::Integer(5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn accessors_match_only_their_kind() {
        assert!(Value::Null.is_null());
        assert!(!Value::from(0).is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(7).as_bool(), None);
        assert_eq!(Value::Integer(7).as_integer(), Some(7));
        assert_eq!(Value::from("7").as_integer(), None);
        assert_eq!(Value::from("parcel").as_text(), Some("parcel"));
        assert_eq!(Value::Bytes(vec![0xca, 0xfe]).as_bytes(), Some(&[0xca, 0xfe][..]));
        assert_eq!(
            Value::Array(vec![Value::Null]).as_array(),
            Some(&[Value::Null][..])
        );
    }

    #[test]
    fn display_renders_plain_values() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::from("Bob").to_string(), "Bob");
        assert_eq!(
            Value::Array(vec![Value::Integer(1), Value::from("a")]).to_string(),
            "[1, a]"
        );
    }

    #[test]
    fn conversions_widen_integers_and_map_none_to_null() {
        assert_eq!(Value::from(-3i8), Value::Integer(-3));
        assert_eq!(Value::from(u32::MAX), Value::Integer(4_294_967_295));
        assert_eq!(Value::from(String::from("a")), Value::from("a"));
        assert_eq!(Value::from(Some(5)), Value::Integer(5));
        assert_eq!(Value::from(None::<&str>), Value::Null);
    }
}
