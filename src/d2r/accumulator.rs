use crate::document::KvValue;
use crate::meta::DocPartHandle;
use crate::table_ref::TableRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Linkage columns carried by every row.
///
/// `pid` is the `rid` of the owning row in the parent doc part and is `None`
/// only for root rows. `seq` is the position inside the parent array and is
/// `None` when the container is an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InternalFields {
    pub did: i32,
    pub rid: i32,
    pub pid: Option<i32>,
    pub seq: Option<i32>,
}

impl InternalFields {
    pub fn root(did: i32) -> Self {
        Self {
            did,
            rid: did,
            pid: None,
            seq: None,
        }
    }
}

/// One decomposed row. Values are indexed by the column positions of the
/// doc part metadata; `None` means the column is absent from this row.
#[derive(Debug, Clone, PartialEq)]
pub struct DocPartRow {
    pub internal: InternalFields,
    scalars: Vec<Option<KvValue>>,
    fields: Vec<Option<KvValue>>,
}

impl DocPartRow {
    pub fn new(internal: InternalFields) -> Self {
        Self {
            internal,
            scalars: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn scalar(&self, position: usize) -> Option<&KvValue> {
        self.scalars.get(position).and_then(Option::as_ref)
    }

    pub fn field(&self, position: usize) -> Option<&KvValue> {
        self.fields.get(position).and_then(Option::as_ref)
    }

    pub(crate) fn set_scalar(&mut self, position: usize, value: KvValue) {
        if self.scalars.len() <= position {
            self.scalars.resize(position + 1, None);
        }
        self.scalars[position] = Some(value);
    }

    pub(crate) fn set_field(&mut self, position: usize, value: KvValue) {
        if self.fields.len() <= position {
            self.fields.resize(position + 1, None);
        }
        self.fields[position] = Some(value);
    }
}

/// Rows of one doc part.
#[derive(Debug, Clone)]
pub struct DocPartData {
    handle: DocPartHandle,
    table_ref: TableRef,
    rows: Vec<DocPartRow>,
}

impl DocPartData {
    pub fn handle(&self) -> DocPartHandle {
        self.handle
    }

    pub fn table_ref(&self) -> &TableRef {
        &self.table_ref
    }

    pub fn rows(&self) -> &[DocPartRow] {
        &self.rows
    }
}

/// Rows of many documents of one collection, collected for one bulk write.
///
/// Doc parts are kept in the order they were first seen, which puts every
/// parent before its children.
#[derive(Debug, Clone)]
pub struct CollectionDataAccumulator {
    database: String,
    collection: String,
    doc_parts: Vec<DocPartData>,
    by_handle: HashMap<DocPartHandle, usize>,
    documents: usize,
}

impl CollectionDataAccumulator {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            doc_parts: Vec::new(),
            by_handle: HashMap::new(),
            documents: 0,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn doc_parts(&self) -> &[DocPartData] {
        &self.doc_parts
    }

    pub fn doc_part(&self, handle: DocPartHandle) -> Option<&DocPartData> {
        self.by_handle
            .get(&handle)
            .map(|index| &self.doc_parts[*index])
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn row_count(&self) -> usize {
        self.doc_parts.iter().map(|part| part.rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.documents == 0
    }

    pub(crate) fn register(&mut self, handle: DocPartHandle, table_ref: &TableRef) {
        if self.by_handle.contains_key(&handle) {
            return;
        }
        self.by_handle.insert(handle, self.doc_parts.len());
        self.doc_parts.push(DocPartData {
            handle,
            table_ref: table_ref.clone(),
            rows: Vec::new(),
        });
    }

    pub(crate) fn push_row(&mut self, handle: DocPartHandle, table_ref: &TableRef, row: DocPartRow) {
        self.register(handle, table_ref);
        if let Some(index) = self.by_handle.get(&handle) {
            self.doc_parts[*index].rows.push(row);
        }
    }

    pub(crate) fn document_added(&mut self) {
        self.documents += 1;
    }
}
