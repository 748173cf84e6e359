//! Storage types of document values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The relational storage type of a value.
///
/// Every scalar [`KvValue`](super::KvValue) maps to exactly one `FieldType`;
/// objects and arrays map to [`FieldType::Child`], whose column only records
/// whether the child doc part holds an object (`false`) or an array (`true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Binary,
    Boolean,
    Date,
    Double,
    Instant,
    Integer,
    Long,
    MongoObjectId,
    MongoTimestamp,
    Null,
    String,
    Time,
    Child,
}

impl FieldType {
    /// All field types, in marker-table order.
    pub const ALL: [FieldType; 13] = [
        FieldType::Binary,
        FieldType::Boolean,
        FieldType::Date,
        FieldType::Double,
        FieldType::Instant,
        FieldType::Integer,
        FieldType::Long,
        FieldType::MongoObjectId,
        FieldType::MongoTimestamp,
        FieldType::Null,
        FieldType::String,
        FieldType::Time,
        FieldType::Child,
    ];

    pub fn is_child(self) -> bool {
        self == FieldType::Child
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Binary => "binary",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Double => "double",
            FieldType::Instant => "instant",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::MongoObjectId => "mongo_object_id",
            FieldType::MongoTimestamp => "mongo_timestamp",
            FieldType::Null => "null",
            FieldType::String => "string",
            FieldType::Time => "time",
            FieldType::Child => "child",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for FieldType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .iter()
            .copied()
            .find(|field_type| field_type.to_string() == s)
            .ok_or_else(|| crate::error::Error::InvalidArgument(format!("unknown field type '{}'", s)))
    }
}
