//! KvValue - the typed, schemaless value model of stored documents.
//!
//! A `KvValue` is what the D2R translator decomposes and what the R2D
//! translator rebuilds. It is richer than plain JSON: integers keep their
//! width and the BSON-specific types (object ids, timestamps, dates) survive
//! the trip through relational columns.
//!
//! # Supported Types
//!
//! - **Null**, **Boolean**
//! - **Integer** (`i32`), **Long** (`i64`), **Double** (`f64`)
//! - **String**, **Binary**
//! - **Date**, **Time**, **Instant** (UTC)
//! - **ObjectId** (12 bytes), **Timestamp** (seconds + ordinal)
//! - **Array**: ordered list of values
//! - **Document**: key-value map
//!
//! # Example
//!
//! ```rust
//! use photondb_d2r::document::{KvDocument, KvValue};
//!
//! let mut doc = KvDocument::new();
//! doc.insert("name", KvValue::from("Alice"));
//! doc.insert("scores", KvValue::Array(vec![KvValue::Integer(95), KvValue::Integer(87)]));
//! assert_eq!(doc.len(), 2);
//! ```

use super::field_type::FieldType;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A value stored in a document.
#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Instant(DateTime<Utc>),
    ObjectId([u8; 12]),
    Timestamp { seconds: u32, ordinal: u32 },
    Array(Vec<KvValue>),
    Document(KvDocument),
}

impl KvValue {
    /// The column type this value is stored as.
    pub fn field_type(&self) -> FieldType {
        match self {
            KvValue::Null => FieldType::Null,
            KvValue::Boolean(_) => FieldType::Boolean,
            KvValue::Integer(_) => FieldType::Integer,
            KvValue::Long(_) => FieldType::Long,
            KvValue::Double(_) => FieldType::Double,
            KvValue::String(_) => FieldType::String,
            KvValue::Binary(_) => FieldType::Binary,
            KvValue::Date(_) => FieldType::Date,
            KvValue::Time(_) => FieldType::Time,
            KvValue::Instant(_) => FieldType::Instant,
            KvValue::ObjectId(_) => FieldType::MongoObjectId,
            KvValue::Timestamp { .. } => FieldType::MongoTimestamp,
            KvValue::Array(_) | KvValue::Document(_) => FieldType::Child,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, KvValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            KvValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KvValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[KvValue]> {
        match self {
            KvValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&KvDocument> {
        match self {
            KvValue::Document(doc) => Some(doc),
            _ => None,
        }
    }
}

/// A document (object) value.
///
/// Keys are kept sorted, so equality ignores insertion order and iteration is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KvDocument {
    entries: BTreeMap<String, KvValue>,
}

impl KvDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: KvValue) -> Option<KvValue> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&KvValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KvValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, KvValue)> for KvDocument {
    fn from_iter<I: IntoIterator<Item = (String, KvValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a KvDocument {
    type Item = (&'a String, &'a KvValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, KvValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// Conversions
impl From<bool> for KvValue {
    fn from(b: bool) -> Self {
        KvValue::Boolean(b)
    }
}

impl From<i32> for KvValue {
    fn from(n: i32) -> Self {
        KvValue::Integer(n)
    }
}

impl From<i64> for KvValue {
    fn from(n: i64) -> Self {
        KvValue::Long(n)
    }
}

impl From<f64> for KvValue {
    fn from(n: f64) -> Self {
        KvValue::Double(n)
    }
}

impl From<String> for KvValue {
    fn from(s: String) -> Self {
        KvValue::String(s)
    }
}

impl From<&str> for KvValue {
    fn from(s: &str) -> Self {
        KvValue::String(s.to_string())
    }
}

impl From<KvDocument> for KvValue {
    fn from(doc: KvDocument) -> Self {
        KvValue::Document(doc)
    }
}

/// Extended-JSON wrappers recognised when converting from `serde_json::Value`.
///
/// A single-key object whose key is one of `$oid`, `$date`, `$time`,
/// `$binary`, `$timestamp` or `$numberLong` is decoded as the matching typed
/// value. Anything malformed stays a plain document.
fn from_extended_json(obj: &Map<String, Value>) -> Option<KvValue> {
    if obj.len() != 1 {
        return None;
    }
    let (key, value) = obj.iter().next()?;
    match key.as_str() {
        "$oid" => {
            let hex = value.as_str()?;
            parse_object_id(hex).map(KvValue::ObjectId)
        }
        "$date" => {
            let text = value.as_str()?;
            if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
                return Some(KvValue::Date(date));
            }
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| KvValue::Instant(dt.with_timezone(&Utc)))
        }
        "$instant" => {
            let text = value.as_str()?;
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| KvValue::Instant(dt.with_timezone(&Utc)))
        }
        "$time" => {
            let text = value.as_str()?;
            NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
                .ok()
                .map(KvValue::Time)
        }
        "$binary" => {
            let text = value.as_str()?;
            BASE64.decode(text).ok().map(KvValue::Binary)
        }
        "$timestamp" => {
            let ts = value.as_object()?;
            let seconds = u32::try_from(ts.get("t")?.as_u64()?).ok()?;
            let ordinal = u32::try_from(ts.get("i")?.as_u64()?).ok()?;
            Some(KvValue::Timestamp { seconds, ordinal })
        }
        "$numberLong" => {
            let text = value.as_str()?;
            text.parse::<i64>().ok().map(KvValue::Long)
        }
        _ => None,
    }
}

pub(crate) fn parse_object_id(hex: &str) -> Option<[u8; 12]> {
    if hex.len() != 24 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let mut bytes = [0u8; 12];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(bytes)
}

pub(crate) fn format_object_id(bytes: &[u8; 12]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl From<Value> for KvValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => KvValue::Null,
            Value::Bool(b) => KvValue::Boolean(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => KvValue::Integer(small),
                        Err(_) => KvValue::Long(i),
                    }
                } else {
                    KvValue::Double(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => KvValue::String(s),
            Value::Array(arr) => KvValue::Array(arr.into_iter().map(KvValue::from).collect()),
            Value::Object(obj) => match from_extended_json(&obj) {
                Some(typed) => typed,
                None => KvValue::Document(
                    obj.into_iter()
                        .map(|(k, v)| (k, KvValue::from(v)))
                        .collect(),
                ),
            },
        }
    }
}

impl From<KvValue> for Value {
    fn from(value: KvValue) -> Self {
        match value {
            KvValue::Null => Value::Null,
            KvValue::Boolean(b) => Value::Bool(b),
            KvValue::Integer(n) => Value::from(n),
            KvValue::Long(n) => json!({ "$numberLong": n.to_string() }),
            KvValue::Double(n) => Value::Number(
                serde_json::Number::from_f64(n).unwrap_or_else(|| serde_json::Number::from(0)),
            ),
            KvValue::String(s) => Value::String(s),
            KvValue::Binary(bytes) => json!({ "$binary": BASE64.encode(bytes) }),
            KvValue::Date(date) => json!({ "$date": date.format("%Y-%m-%d").to_string() }),
            KvValue::Time(time) => json!({ "$time": time.format("%H:%M:%S%.f").to_string() }),
            KvValue::Instant(instant) => {
                json!({ "$date": instant.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
            }
            KvValue::ObjectId(oid) => json!({ "$oid": format_object_id(&oid) }),
            KvValue::Timestamp { seconds, ordinal } => {
                json!({ "$timestamp": { "t": seconds, "i": ordinal } })
            }
            KvValue::Array(arr) => Value::Array(arr.into_iter().map(Value::from).collect()),
            KvValue::Document(doc) => Value::from(doc),
        }
    }
}

impl From<Value> for KvDocument {
    /// Non-object JSON values become an empty document.
    fn from(value: Value) -> Self {
        match KvValue::from(value) {
            KvValue::Document(doc) => doc,
            _ => KvDocument::new(),
        }
    }
}

impl From<KvDocument> for Value {
    fn from(doc: KvDocument) -> Self {
        Value::Object(
            doc.entries
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect(),
        )
    }
}

impl fmt::Display for KvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvValue::Null => write!(f, "null"),
            KvValue::Boolean(b) => write!(f, "{}", b),
            KvValue::Integer(n) => write!(f, "{}", n),
            KvValue::Long(n) => write!(f, "{}L", n),
            KvValue::Double(n) => write!(f, "{}", n),
            KvValue::String(s) => write!(f, "\"{}\"", s),
            KvValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            KvValue::Date(date) => write!(f, "{}", date),
            KvValue::Time(time) => write!(f, "{}", time),
            KvValue::Instant(instant) => write!(f, "{}", instant.to_rfc3339()),
            KvValue::ObjectId(oid) => write!(f, "ObjectId({})", format_object_id(oid)),
            KvValue::Timestamp { seconds, ordinal } => write!(f, "Timestamp({}, {})", seconds, ordinal),
            KvValue::Array(arr) => {
                write!(f, "[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            KvValue::Document(doc) => write!(f, "{}", doc),
        }
    }
}

impl fmt::Display for KvDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{}\": {}", key, value)?;
        }
        write!(f, "}}")
    }
}
