//! Metadata snapshot of the relational schema.
//!
//! # Overview
//!
//! Every document stored by the engine lands in tables whose names were minted
//! by the identifier factory. The snapshot remembers those names in a
//! four-level hierarchy:
//! ```text
//! Databases (name → schema identifier)
//!   └─→ Collections (name → identifier, unique across all databases)
//!        └─→ Doc parts (TableRef → table identifier)
//!             └─→ Fields (name + type → column identifier) and scalars
//! ```
//! Indexes live next to doc parts and share the database-wide table
//! namespace with them.
//!
//! # Architecture
//!
//! Entities are stored in flat arenas inside [`MetaSnapshot`] and refer to
//! each other through integer handles ([`DatabaseHandle`],
//! [`CollectionHandle`], [`DocPartHandle`]), so children never own their
//! parents. Each namespace the identifier checkers query has its own lookup
//! map, updated together with the arena by the `add_*` methods.
//!
//! A snapshot is a point-in-time value. Concurrent readers share it through an
//! `Arc` handed out by [`MetainfoRepository`]; writers mutate a private copy
//! that is committed with a new version number.
//!
//! # Examples
//!
//! ```rust
//! use photondb_d2r::meta::MetaSnapshot;
//! use photondb_d2r::table_ref::TableRef;
//!
//! # fn example() -> photondb_d2r::error::Result<()> {
//! let mut snapshot = MetaSnapshot::new();
//! let db = snapshot.add_database("shop", "shop")?;
//! let orders = snapshot.add_collection(db, "orders", "shop_orders")?;
//! let root = snapshot.add_doc_part(orders, TableRef::root(), "orders")?;
//!
//! assert!(snapshot.database(db).contains_table_identifier("orders"));
//! assert_eq!(snapshot.doc_part(root).identifier(), "orders");
//! # Ok(())
//! # }
//! ```

mod repository;

pub use repository::MetainfoRepository;

use crate::document::FieldType;
use crate::error::{Error, Result};
use crate::table_ref::TableRef;
use std::collections::{HashMap, HashSet};

/// Handle of a database inside a [`MetaSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatabaseHandle(usize);

/// Handle of a collection inside a [`MetaSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionHandle(usize);

/// Handle of a doc part inside a [`MetaSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocPartHandle(usize);

/// A database and the table namespace it spans.
#[derive(Debug, Clone)]
pub struct MetaDatabase {
    handle: DatabaseHandle,
    name: String,
    identifier: String,
    collections: Vec<CollectionHandle>,
    collection_by_name: HashMap<String, CollectionHandle>,
    /// Doc-part and index identifiers; both kinds share one namespace.
    table_identifiers: HashSet<String>,
    indexes: Vec<MetaIndex>,
}

impl MetaDatabase {
    pub fn handle(&self) -> DatabaseHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn collections(&self) -> &[CollectionHandle] {
        &self.collections
    }

    pub fn collection_by_name(&self, name: &str) -> Option<CollectionHandle> {
        self.collection_by_name.get(name).copied()
    }

    /// Whether a doc part or an index of this database uses `identifier`.
    pub fn contains_table_identifier(&self, identifier: &str) -> bool {
        self.table_identifiers.contains(identifier)
    }

    pub fn indexes(&self) -> &[MetaIndex] {
        &self.indexes
    }

    pub fn index_by_identifier(&self, identifier: &str) -> Option<&MetaIndex> {
        self.indexes.iter().find(|index| index.identifier == identifier)
    }
}

#[derive(Debug, Clone)]
pub struct MetaCollection {
    handle: CollectionHandle,
    database: DatabaseHandle,
    name: String,
    identifier: String,
    doc_parts: Vec<DocPartHandle>,
    doc_part_by_ref: HashMap<TableRef, DocPartHandle>,
}

impl MetaCollection {
    pub fn handle(&self) -> CollectionHandle {
        self.handle
    }

    pub fn database(&self) -> DatabaseHandle {
        self.database
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Doc parts in creation order. Parents are always created before their
    /// children.
    pub fn doc_parts(&self) -> &[DocPartHandle] {
        &self.doc_parts
    }

    pub fn doc_part_by_table_ref(&self, table_ref: &TableRef) -> Option<DocPartHandle> {
        self.doc_part_by_ref.get(table_ref).copied()
    }
}

/// A named, typed column of a doc part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaField {
    pub name: String,
    pub field_type: FieldType,
    pub identifier: String,
}

/// A scalar column holding array elements of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaScalar {
    pub field_type: FieldType,
    pub identifier: String,
}

/// One column of a doc part as seen by readers: scalars first, then fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaColumn<'a> {
    Scalar(&'a MetaScalar),
    Field(&'a MetaField),
}

impl<'a> MetaColumn<'a> {
    pub fn identifier(&self) -> &'a str {
        match self {
            MetaColumn::Scalar(scalar) => &scalar.identifier,
            MetaColumn::Field(field) => &field.identifier,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            MetaColumn::Scalar(scalar) => scalar.field_type,
            MetaColumn::Field(field) => field.field_type,
        }
    }
}

/// A table holding every value found at one [`TableRef`] of a collection.
#[derive(Debug, Clone)]
pub struct MetaDocPart {
    handle: DocPartHandle,
    collection: CollectionHandle,
    table_ref: TableRef,
    identifier: String,
    fields: Vec<MetaField>,
    field_by_key: HashMap<(String, FieldType), usize>,
    field_by_identifier: HashMap<String, usize>,
    scalars: Vec<MetaScalar>,
    scalar_by_type: HashMap<FieldType, usize>,
}

impl MetaDocPart {
    pub fn handle(&self) -> DocPartHandle {
        self.handle
    }

    pub fn collection(&self) -> CollectionHandle {
        self.collection
    }

    pub fn table_ref(&self) -> &TableRef {
        &self.table_ref
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn fields(&self) -> &[MetaField] {
        &self.fields
    }

    pub fn scalars(&self) -> &[MetaScalar] {
        &self.scalars
    }

    /// Position of the field `(name, field_type)` in [`fields`](Self::fields).
    pub fn field_position(&self, name: &str, field_type: FieldType) -> Option<usize> {
        self.field_by_key.get(&(name.to_string(), field_type)).copied()
    }

    pub fn field_by_identifier(&self, identifier: &str) -> Option<&MetaField> {
        self.field_by_identifier
            .get(identifier)
            .map(|position| &self.fields[*position])
    }

    /// Position of the scalar of `field_type` in [`scalars`](Self::scalars).
    pub fn scalar_position(&self, field_type: FieldType) -> Option<usize> {
        self.scalar_by_type.get(&field_type).copied()
    }

    /// All value columns in read order.
    pub fn columns(&self) -> impl Iterator<Item = MetaColumn<'_>> {
        self.scalars
            .iter()
            .map(MetaColumn::Scalar)
            .chain(self.fields.iter().map(MetaColumn::Field))
    }

    pub fn column_count(&self) -> usize {
        self.scalars.len() + self.fields.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaIndex {
    pub identifier: String,
    pub table_identifier: String,
    /// Column identifiers with their ascending flag.
    pub columns: Vec<(String, bool)>,
}

/// Point-in-time view of every known database, collection, doc part, field
/// and index.
#[derive(Debug, Clone, Default)]
pub struct MetaSnapshot {
    version: u64,
    databases: Vec<MetaDatabase>,
    collections: Vec<MetaCollection>,
    doc_parts: Vec<MetaDocPart>,
    database_by_name: HashMap<String, DatabaseHandle>,
    database_by_identifier: HashMap<String, DatabaseHandle>,
    collection_identifiers: HashSet<String>,
}

impl MetaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of this snapshot; bumped on every committed modification.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn databases(&self) -> impl Iterator<Item = &MetaDatabase> {
        self.databases.iter()
    }

    pub fn database(&self, handle: DatabaseHandle) -> &MetaDatabase {
        &self.databases[handle.0]
    }

    pub fn database_by_name(&self, name: &str) -> Option<&MetaDatabase> {
        self.database_by_name
            .get(name)
            .map(|handle| &self.databases[handle.0])
    }

    pub fn database_by_identifier(&self, identifier: &str) -> Option<&MetaDatabase> {
        self.database_by_identifier
            .get(identifier)
            .map(|handle| &self.databases[handle.0])
    }

    pub fn collection(&self, handle: CollectionHandle) -> &MetaCollection {
        &self.collections[handle.0]
    }

    pub fn collection_by_name(&self, database: &str, collection: &str) -> Option<&MetaCollection> {
        self.database_by_name(database)
            .and_then(|db| db.collection_by_name(collection))
            .map(|handle| &self.collections[handle.0])
    }

    /// Whether any database has a collection with `identifier`.
    pub fn contains_collection_identifier(&self, identifier: &str) -> bool {
        self.collection_identifiers.contains(identifier)
    }

    pub fn doc_part(&self, handle: DocPartHandle) -> &MetaDocPart {
        &self.doc_parts[handle.0]
    }

    /// Doc parts of a collection in creation order.
    pub fn doc_parts_of(&self, collection: CollectionHandle) -> impl Iterator<Item = &MetaDocPart> {
        self.collections[collection.0]
            .doc_parts
            .iter()
            .map(move |handle| &self.doc_parts[handle.0])
    }

    pub fn add_database(&mut self, name: &str, identifier: &str) -> Result<DatabaseHandle> {
        if self.database_by_name.contains_key(name) {
            return Err(Error::AlreadyExists(format!("database '{}'", name)));
        }
        if self.database_by_identifier.contains_key(identifier) {
            return Err(Error::AlreadyExists(format!(
                "database identifier '{}'",
                identifier
            )));
        }

        let handle = DatabaseHandle(self.databases.len());
        self.databases.push(MetaDatabase {
            handle,
            name: name.to_string(),
            identifier: identifier.to_string(),
            collections: Vec::new(),
            collection_by_name: HashMap::new(),
            table_identifiers: HashSet::new(),
            indexes: Vec::new(),
        });
        self.database_by_name.insert(name.to_string(), handle);
        self.database_by_identifier.insert(identifier.to_string(), handle);
        Ok(handle)
    }

    pub fn add_collection(
        &mut self,
        database: DatabaseHandle,
        name: &str,
        identifier: &str,
    ) -> Result<CollectionHandle> {
        let db = &self.databases[database.0];
        if db.collection_by_name.contains_key(name) {
            return Err(Error::AlreadyExists(format!(
                "collection '{}.{}'",
                db.name, name
            )));
        }
        if self.collection_identifiers.contains(identifier) {
            return Err(Error::AlreadyExists(format!(
                "collection identifier '{}'",
                identifier
            )));
        }

        let handle = CollectionHandle(self.collections.len());
        self.collections.push(MetaCollection {
            handle,
            database,
            name: name.to_string(),
            identifier: identifier.to_string(),
            doc_parts: Vec::new(),
            doc_part_by_ref: HashMap::new(),
        });
        let db = &mut self.databases[database.0];
        db.collections.push(handle);
        db.collection_by_name.insert(name.to_string(), handle);
        self.collection_identifiers.insert(identifier.to_string());
        Ok(handle)
    }

    /// Register the doc part for `table_ref`. Its parent doc part must exist
    /// already.
    pub fn add_doc_part(
        &mut self,
        collection: CollectionHandle,
        table_ref: TableRef,
        identifier: &str,
    ) -> Result<DocPartHandle> {
        let coll = &self.collections[collection.0];
        if coll.doc_part_by_ref.contains_key(&table_ref) {
            return Err(Error::AlreadyExists(format!(
                "doc part {} of collection '{}'",
                table_ref, coll.name
            )));
        }
        if let Some(parent) = table_ref.parent() {
            if !coll.doc_part_by_ref.contains_key(parent) {
                return Err(Error::NotFound(format!(
                    "parent doc part {} of {}",
                    parent, table_ref
                )));
            }
        }
        let database = coll.database;
        if self.databases[database.0].contains_table_identifier(identifier) {
            return Err(Error::AlreadyExists(format!(
                "table identifier '{}'",
                identifier
            )));
        }

        let handle = DocPartHandle(self.doc_parts.len());
        self.doc_parts.push(MetaDocPart {
            handle,
            collection,
            table_ref: table_ref.clone(),
            identifier: identifier.to_string(),
            fields: Vec::new(),
            field_by_key: HashMap::new(),
            field_by_identifier: HashMap::new(),
            scalars: Vec::new(),
            scalar_by_type: HashMap::new(),
        });
        let coll = &mut self.collections[collection.0];
        coll.doc_parts.push(handle);
        coll.doc_part_by_ref.insert(table_ref, handle);
        self.databases[database.0]
            .table_identifiers
            .insert(identifier.to_string());
        Ok(handle)
    }

    /// Register a field column and return its position.
    pub fn add_field(
        &mut self,
        doc_part: DocPartHandle,
        name: &str,
        field_type: FieldType,
        identifier: &str,
    ) -> Result<usize> {
        let part = &mut self.doc_parts[doc_part.0];
        let key = (name.to_string(), field_type);
        if part.field_by_key.contains_key(&key) {
            return Err(Error::AlreadyExists(format!(
                "field '{}' of type {} in {}",
                name, field_type, part.identifier
            )));
        }
        if part.field_by_identifier.contains_key(identifier)
            || part.scalars.iter().any(|scalar| scalar.identifier == identifier)
        {
            return Err(Error::AlreadyExists(format!(
                "column identifier '{}' in {}",
                identifier, part.identifier
            )));
        }

        let position = part.fields.len();
        part.fields.push(MetaField {
            name: name.to_string(),
            field_type,
            identifier: identifier.to_string(),
        });
        part.field_by_key.insert(key, position);
        part.field_by_identifier.insert(identifier.to_string(), position);
        Ok(position)
    }

    /// Register the scalar column of `field_type` and return its position.
    pub fn add_scalar(
        &mut self,
        doc_part: DocPartHandle,
        field_type: FieldType,
        identifier: &str,
    ) -> Result<usize> {
        let part = &mut self.doc_parts[doc_part.0];
        if part.scalar_by_type.contains_key(&field_type) {
            return Err(Error::AlreadyExists(format!(
                "scalar of type {} in {}",
                field_type, part.identifier
            )));
        }
        if part.field_by_identifier.contains_key(identifier) {
            return Err(Error::AlreadyExists(format!(
                "column identifier '{}' in {}",
                identifier, part.identifier
            )));
        }

        let position = part.scalars.len();
        part.scalars.push(MetaScalar {
            field_type,
            identifier: identifier.to_string(),
        });
        part.scalar_by_type.insert(field_type, position);
        Ok(position)
    }

    pub fn add_index(&mut self, database: DatabaseHandle, index: MetaIndex) -> Result<()> {
        let db = &mut self.databases[database.0];
        if db.table_identifiers.contains(&index.identifier) {
            return Err(Error::AlreadyExists(format!(
                "table identifier '{}'",
                index.identifier
            )));
        }
        db.table_identifiers.insert(index.identifier.clone());
        db.indexes.push(index);
        Ok(())
    }
}
