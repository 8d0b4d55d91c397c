//! Row values, data types and column definitions.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types a column can have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Integer,
    Boolean,
    Timestamp,
    /// raw bytes
    Blob,
    /// array of values of the inner type
    Array(Box<DataType>),
}

impl DataType {
    /// Get the SQL name for this type.
    pub fn sql_name(&self) -> String {
        match self {
            DataType::Text => "TEXT".into(),
            DataType::Integer => "BIGINT".into(),
            DataType::Boolean => "BOOLEAN".into(),
            DataType::Timestamp => "TIMESTAMP".into(),
            DataType::Blob => "BLOB".into(),
            DataType::Array(inner) => format!("ARRAY<{}>", inner.sql_name()),
        }
    }

    /// Check if a value fits this type. NULL fits everything.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (DataType::Text, Value::Text(_)) => true,
            (DataType::Integer, Value::Int(_)) => true,
            (DataType::Boolean, Value::Bool(_)) => true,
            (DataType::Timestamp, Value::Timestamp(_)) => true,
            (DataType::Blob, Value::Blob(_)) => true,
            (DataType::Array(inner), Value::Array(items)) => items.iter().all(|v| inner.matches(v)),
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// A single cell of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Blob(Vec<u8>),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Blob(_) => "blob",
            Value::Array(_) => "array",
        }
    }

    /// SQL truthiness: NULL, false, zero and empty values are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Text(s) => !s.is_empty(),
            Value::Timestamp(_) => true,
            Value::Blob(b) => !b.is_empty(),
            Value::Array(a) => !a.is_empty(),
        }
    }

    /// Order two values of compatible types. Text compares with blobs byte
    /// wise; anything else across types is unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Blob(b)) => Some(a.as_bytes().cmp(b.as_slice())),
            (Value::Blob(a), Value::Text(b)) => Some(a.as_slice().cmp(b.as_bytes())),
            (Value::Timestamp(a), Value::Text(b)) => parse_timestamp(b).map(|b| a.cmp(&b)),
            (Value::Text(a), Value::Timestamp(b)) => parse_timestamp(a).map(|a| a.cmp(b)),
            _ => None,
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            Value::Blob(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<git2::Oid> for Value {
    fn from(oid: git2::Oid) -> Self {
        Value::Text(oid.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

/// Column definition of a cursor schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// table the column belongs to
    pub source: String,
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, source: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            data_type,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.source, self.name, self.data_type)?;
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_matches() {
        assert!(DataType::Text.matches(&Value::from("a")));
        assert!(!DataType::Text.matches(&Value::Int(1)));
        assert!(DataType::Integer.matches(&Value::Null));

        let parents = DataType::Array(Box::new(DataType::Text));
        assert!(parents.matches(&Value::Array(vec![Value::from("a")])));
        assert!(!parents.matches(&Value::Array(vec![Value::Int(1)])));
        assert_eq!(parents.sql_name(), "ARRAY<TEXT>");
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(
            Value::from("abc").compare(&Value::Blob(b"abc".to_vec())),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::Int(1).compare(&Value::from("1")), None);

        let ts = DateTime::parse_from_rfc3339("2017-07-14T02:40:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            Value::Timestamp(ts).compare(&Value::from("2017-07-14 02:40:00")),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_truthiness_and_display() {
        assert!(!Value::Null.is_truthy());
        assert!(Value::Int(3).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert_eq!(
            Value::Array(vec![Value::from("a"), Value::Int(2)]).to_string(),
            "[a, 2]"
        );
    }

    #[test]
    fn test_value_serializes_untagged() {
        let json = serde_json::to_string(&vec![Value::from("x"), Value::Int(1), Value::Null]).unwrap();
        assert_eq!(json, r#"["x",1,null]"#);
    }
}
