use crate::backend::constraints::IdentifierConstraints;
use crate::meta::{MetaDatabase, MetaDocPart, MetaSnapshot};

/// Namespace check for one kind of identifier.
pub trait IdentifierChecker {
    /// Whether no entity of the namespace uses `identifier` yet.
    fn is_unique(&self, identifier: &str) -> bool;

    /// Whether the backend accepts `identifier` for this kind of object.
    fn is_allowed(&self, constraints: &dyn IdentifierConstraints, identifier: &str) -> bool;
}

pub struct DatabaseIdentifierChecker<'a> {
    snapshot: &'a MetaSnapshot,
}

impl<'a> DatabaseIdentifierChecker<'a> {
    pub fn new(snapshot: &'a MetaSnapshot) -> Self {
        Self { snapshot }
    }
}

impl IdentifierChecker for DatabaseIdentifierChecker<'_> {
    fn is_unique(&self, identifier: &str) -> bool {
        self.snapshot.database_by_identifier(identifier).is_none()
    }

    fn is_allowed(&self, constraints: &dyn IdentifierConstraints, identifier: &str) -> bool {
        constraints.is_allowed_schema_identifier(identifier)
    }
}

/// Collection identifiers are unique across every database.
pub struct CollectionIdentifierChecker<'a> {
    snapshot: &'a MetaSnapshot,
}

impl<'a> CollectionIdentifierChecker<'a> {
    pub fn new(snapshot: &'a MetaSnapshot) -> Self {
        Self { snapshot }
    }
}

impl IdentifierChecker for CollectionIdentifierChecker<'_> {
    fn is_unique(&self, identifier: &str) -> bool {
        !self.snapshot.contains_collection_identifier(identifier)
    }

    fn is_allowed(&self, constraints: &dyn IdentifierConstraints, identifier: &str) -> bool {
        constraints.is_allowed_schema_identifier(identifier)
    }
}

/// Doc-part tables share their namespace with indexes.
pub struct TableIdentifierChecker<'a> {
    database: &'a MetaDatabase,
}

impl<'a> TableIdentifierChecker<'a> {
    pub fn new(database: &'a MetaDatabase) -> Self {
        Self { database }
    }
}

impl IdentifierChecker for TableIdentifierChecker<'_> {
    fn is_unique(&self, identifier: &str) -> bool {
        !self.database.contains_table_identifier(identifier)
    }

    fn is_allowed(&self, constraints: &dyn IdentifierConstraints, identifier: &str) -> bool {
        constraints.is_allowed_table_identifier(identifier)
    }
}

pub struct FieldIdentifierChecker<'a> {
    doc_part: &'a MetaDocPart,
}

impl<'a> FieldIdentifierChecker<'a> {
    pub fn new(doc_part: &'a MetaDocPart) -> Self {
        Self { doc_part }
    }
}

impl IdentifierChecker for FieldIdentifierChecker<'_> {
    fn is_unique(&self, identifier: &str) -> bool {
        self.doc_part.field_by_identifier(identifier).is_none()
    }

    fn is_allowed(&self, constraints: &dyn IdentifierConstraints, identifier: &str) -> bool {
        constraints.is_allowed_column_identifier(identifier)
    }
}

pub struct IndexIdentifierChecker<'a> {
    database: &'a MetaDatabase,
}

impl<'a> IndexIdentifierChecker<'a> {
    pub fn new(database: &'a MetaDatabase) -> Self {
        Self { database }
    }
}

impl IdentifierChecker for IndexIdentifierChecker<'_> {
    fn is_unique(&self, identifier: &str) -> bool {
        !self.database.contains_table_identifier(identifier)
    }

    fn is_allowed(&self, constraints: &dyn IdentifierConstraints, identifier: &str) -> bool {
        constraints.is_allowed_index_identifier(identifier)
    }
}
