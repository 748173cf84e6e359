//! Identifier constraints of a relational backend.
//!
//! The identifier factory never hard-codes backend limits. Everything it needs
//! to know about the target engine (maximum identifier length, separators,
//! reserved names and the per-type column markers) comes through the
//! [`IdentifierConstraints`] trait.

use crate::document::FieldType;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashSet};

/// Name of the schema holding the engine's own catalog tables.
pub const TORODB_SCHEMA: &str = "torodb";

/// Internal linkage columns present on every doc-part table.
pub const DID_COLUMN: &str = "did";
pub const RID_COLUMN: &str = "rid";
pub const PID_COLUMN: &str = "pid";
pub const SEQ_COLUMN: &str = "seq";

/// Prefix of the scalar columns used for array elements.
pub const SCALAR_COLUMN: &str = "v";

pub trait IdentifierConstraints: Send + Sync {
    fn separator(&self) -> char;

    fn array_dimension_separator(&self) -> char;

    fn identifier_max_size(&self) -> usize;

    fn is_allowed_schema_identifier(&self, identifier: &str) -> bool;

    fn is_allowed_table_identifier(&self, identifier: &str) -> bool;

    fn is_allowed_column_identifier(&self, identifier: &str) -> bool;

    fn is_allowed_index_identifier(&self, identifier: &str) -> bool;

    /// Single character appended to column identifiers of this type.
    fn field_type_identifier(&self, field_type: FieldType) -> char;

    /// Column identifier used for array elements of this type.
    fn scalar_identifier(&self, field_type: FieldType) -> String;
}

/// Table driven constraints shared by the supported backends.
#[derive(Debug, Clone)]
pub struct DefaultIdentifierConstraints {
    identifier_max_size: usize,
    field_type_identifiers: BTreeMap<FieldType, char>,
    scalar_identifiers: BTreeMap<FieldType, String>,
    restricted_schema_names: HashSet<String>,
    restricted_column_names: HashSet<String>,
}

/// Catalog schemas of PostgreSQL.
pub const POSTGRESQL_RESERVED_SCHEMAS: [&str; 3] = ["pg_catalog", "information_schema", "public"];

/// System schemas of Derby.
pub const DERBY_RESERVED_SCHEMAS: [&str; 8] = [
    "sys",
    "sysibm",
    "syscat",
    "syscs_diag",
    "syscs_util",
    "sysfun",
    "sysproc",
    "sysstat",
];

const SEPARATOR: char = '_';
const ARRAY_DIMENSION_SEPARATOR: char = '$';

fn default_marker(field_type: FieldType) -> char {
    match field_type {
        FieldType::Binary => 'r',
        FieldType::Boolean => 'b',
        FieldType::Date => 'c',
        FieldType::Double => 'd',
        FieldType::Instant => 'g',
        FieldType::Integer => 'i',
        FieldType::Long => 'l',
        FieldType::MongoObjectId => 'x',
        FieldType::MongoTimestamp => 'y',
        FieldType::Null => 'n',
        FieldType::String => 's',
        FieldType::Time => 't',
        FieldType::Child => 'e',
    }
}

impl DefaultIdentifierConstraints {
    /// Build constraints with the default type markers.
    ///
    /// The `torodb` schema and the linkage and scalar columns are always
    /// reserved; the given names are reserved in addition.
    pub fn new<S, C>(identifier_max_size: usize, restricted_schemas: S, restricted_columns: C) -> Result<Self>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let markers = FieldType::ALL
            .iter()
            .map(|field_type| (*field_type, default_marker(*field_type)))
            .collect();
        Self::with_markers(identifier_max_size, markers, restricted_schemas, restricted_columns)
    }

    /// Build constraints with explicit type markers.
    ///
    /// Every field type must be mapped to a distinct marker in `[a-z0-9]`.
    pub fn with_markers<S, C>(
        identifier_max_size: usize,
        markers: BTreeMap<FieldType, char>,
        restricted_schemas: S,
        restricted_columns: C,
    ) -> Result<Self>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        if identifier_max_size < 2 {
            return Err(Error::InvalidArgument(format!(
                "identifier max size {} is too small",
                identifier_max_size
            )));
        }

        let mut used = HashSet::new();
        let mut scalar_identifiers = BTreeMap::new();
        for field_type in FieldType::ALL {
            let marker = *markers.get(&field_type).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "field type {} has not been mapped to an identifier",
                    field_type
                ))
            })?;
            if !(marker.is_ascii_lowercase() || marker.is_ascii_digit()) {
                return Err(Error::InvalidArgument(format!(
                    "field type {} has an unallowed identifier {}",
                    field_type, marker
                )));
            }
            if !used.insert(marker) {
                return Err(Error::InvalidArgument(format!(
                    "field type {} identifier {} was used by another field type",
                    field_type, marker
                )));
            }
            scalar_identifiers.insert(field_type, format!("{}{}{}", SCALAR_COLUMN, SEPARATOR, marker));
        }

        let mut restricted_schema_names: HashSet<String> =
            restricted_schemas.into_iter().map(Into::into).collect();
        restricted_schema_names.insert(TORODB_SCHEMA.to_string());

        let mut restricted_column_names: HashSet<String> =
            restricted_columns.into_iter().map(Into::into).collect();
        for column in [DID_COLUMN, RID_COLUMN, PID_COLUMN, SEQ_COLUMN] {
            restricted_column_names.insert(column.to_string());
        }
        restricted_column_names.extend(scalar_identifiers.values().cloned());

        Ok(Self {
            identifier_max_size,
            field_type_identifiers: markers,
            scalar_identifiers,
            restricted_schema_names,
            restricted_column_names,
        })
    }

    /// PostgreSQL: 63 byte identifiers and its catalog schemas reserved.
    pub fn postgresql() -> Result<Self> {
        Self::new(63, POSTGRESQL_RESERVED_SCHEMAS, std::iter::empty::<String>())
    }

    /// Embedded Derby: 128 character identifiers and its system schemas reserved.
    pub fn derby() -> Result<Self> {
        Self::new(128, DERBY_RESERVED_SCHEMAS, std::iter::empty::<String>())
    }
}

impl IdentifierConstraints for DefaultIdentifierConstraints {
    fn separator(&self) -> char {
        SEPARATOR
    }

    fn array_dimension_separator(&self) -> char {
        ARRAY_DIMENSION_SEPARATOR
    }

    fn identifier_max_size(&self) -> usize {
        self.identifier_max_size
    }

    fn is_allowed_schema_identifier(&self, identifier: &str) -> bool {
        !self.restricted_schema_names.contains(identifier)
    }

    fn is_allowed_table_identifier(&self, _identifier: &str) -> bool {
        true
    }

    fn is_allowed_column_identifier(&self, identifier: &str) -> bool {
        !self.restricted_column_names.contains(identifier)
    }

    fn is_allowed_index_identifier(&self, _identifier: &str) -> bool {
        true
    }

    fn field_type_identifier(&self, field_type: FieldType) -> char {
        self.field_type_identifiers
            .get(&field_type)
            .copied()
            .unwrap_or_else(|| default_marker(field_type))
    }

    fn scalar_identifier(&self, field_type: FieldType) -> String {
        match self.scalar_identifiers.get(&field_type) {
            Some(identifier) => identifier.clone(),
            None => format!("{}{}{}", SCALAR_COLUMN, SEPARATOR, self.field_type_identifier(field_type)),
        }
    }
}
