//! Relational to document translation
//!
//! Storage backends expose their query results as one cursor per doc part.
//! [`R2DBackendTranslator`] is the small adapter a backend implements to walk
//! such a cursor; [`R2DTranslator`] buffers every row, links children to
//! parents through `pid == rid` within a `did`, orders array elements by
//! `seq` and rebuilds the documents.

use crate::d2r::InternalFields;
use crate::document::{FieldType, KvDocument, KvValue, ToroDocument};
use crate::error::{Error, Result};
use crate::meta::{MetaColumn, MetaDocPart};
use crate::table_ref::TableRef;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Cursor access a storage backend provides to the R2D translator.
pub trait R2DBackendTranslator {
    type Cursor;

    /// Advance to the next row. Fails with a retryable error when the
    /// backend detects a conflicting transaction.
    fn next(&self, cursor: &mut Self::Cursor) -> Result<bool>;

    /// Linkage columns of the current row. A null `did` or `rid`, or a null
    /// `pid` on a non-root doc part, is a data-integrity fault.
    fn read_internal_fields(&self, doc_part: &MetaDocPart, cursor: &Self::Cursor) -> Result<InternalFields>;

    /// Value of the column at `field_index` of [`MetaDocPart::columns`];
    /// `None` for a stored null.
    fn get_value(
        &self,
        field_type: FieldType,
        cursor: &Self::Cursor,
        internal: &InternalFields,
        field_index: usize,
    ) -> Result<Option<KvValue>>;
}

/// The rows of one doc part as returned by a backend.
pub struct DocPartResult<'m, C> {
    pub doc_part: &'m MetaDocPart,
    pub cursor: C,
}

impl<'m, C> DocPartResult<'m, C> {
    pub fn new(doc_part: &'m MetaDocPart, cursor: C) -> Self {
        Self { doc_part, cursor }
    }
}

struct ReadRow {
    internal: InternalFields,
    values: Vec<(usize, KvValue)>,
}

struct PartRows<'m> {
    doc_part: &'m MetaDocPart,
    rows: Vec<ReadRow>,
}

struct PartView<'r, 'm> {
    columns: Vec<MetaColumn<'m>>,
    by_parent: HashMap<(i32, i32), Vec<&'r ReadRow>>,
}

struct Assembler<'r, 'm> {
    views: HashMap<&'r TableRef, PartView<'r, 'm>>,
}

/// Rebuilds documents from doc-part cursors.
pub struct R2DTranslator<B> {
    backend: B,
}

impl<B: R2DBackendTranslator> R2DTranslator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consume every cursor and return the documents found, in the order of
    /// their root rows.
    pub fn translate<'m, I>(&self, results: I) -> Result<Vec<ToroDocument>>
    where
        I: IntoIterator<Item = DocPartResult<'m, B::Cursor>>,
    {
        let mut parts: HashMap<TableRef, PartRows<'m>> = HashMap::new();
        for DocPartResult { doc_part, mut cursor } in results {
            let part = parts
                .entry(doc_part.table_ref().clone())
                .or_insert_with(|| PartRows {
                    doc_part,
                    rows: Vec::new(),
                });
            self.read_rows(doc_part, &mut cursor, &mut part.rows)?;
        }

        let documents = Assembler::new(&parts).documents(parts.get(&TableRef::root()))?;
        debug!(documents = documents.len(), doc_parts = parts.len(), "Translated rows to documents");
        Ok(documents)
    }

    fn read_rows(&self, doc_part: &MetaDocPart, cursor: &mut B::Cursor, rows: &mut Vec<ReadRow>) -> Result<()> {
        let columns: Vec<FieldType> = doc_part.columns().map(|column| column.field_type()).collect();
        while self.backend.next(cursor)? {
            let internal = self.backend.read_internal_fields(doc_part, cursor)?;
            if !doc_part.table_ref().is_root() && internal.pid.is_none() {
                warn!(doc_part = %doc_part.identifier(), did = internal.did, rid = internal.rid, "Row without pid");
                return Err(Error::DataIntegrity(format!(
                    "row {} of document {} in {} has no pid",
                    internal.rid,
                    internal.did,
                    doc_part.identifier()
                )));
            }

            let mut values = Vec::new();
            for (index, field_type) in columns.iter().enumerate() {
                if let Some(value) = self.backend.get_value(*field_type, cursor, &internal, index)? {
                    values.push((index, value));
                }
            }
            rows.push(ReadRow { internal, values });
        }
        Ok(())
    }
}

fn integrity(message: String) -> Error {
    warn!(%message, "Data integrity fault while rebuilding documents");
    Error::DataIntegrity(message)
}

impl<'r, 'm> Assembler<'r, 'm> {
    fn new(parts: &'r HashMap<TableRef, PartRows<'m>>) -> Self {
        let views = parts
            .iter()
            .map(|(table_ref, part)| {
                let mut by_parent: HashMap<(i32, i32), Vec<&'r ReadRow>> = HashMap::new();
                for row in &part.rows {
                    if let Some(pid) = row.internal.pid {
                        by_parent.entry((row.internal.did, pid)).or_default().push(row);
                    }
                }
                let view = PartView {
                    columns: part.doc_part.columns().collect(),
                    by_parent,
                };
                (table_ref, view)
            })
            .collect();
        Self { views }
    }

    fn documents(&self, root: Option<&'r PartRows<'m>>) -> Result<Vec<ToroDocument>> {
        let Some(root) = root else {
            return Ok(Vec::new());
        };
        let table_ref = root.doc_part.table_ref();
        let Some(view) = self.views.get(table_ref) else {
            return Ok(Vec::new());
        };

        root.rows
            .iter()
            .map(|row| {
                let document = self.build_object(table_ref, view, row)?;
                Ok(ToroDocument::new(row.internal.did, document))
            })
            .collect()
    }

    fn build_object(&self, table_ref: &TableRef, view: &PartView<'r, 'm>, row: &ReadRow) -> Result<KvDocument> {
        let mut document = KvDocument::new();
        for (index, value) in &row.values {
            match view.columns[*index] {
                MetaColumn::Scalar(scalar) => {
                    return Err(integrity(format!(
                        "scalar {} outside an array in row {} of document {}",
                        scalar.identifier, row.internal.rid, row.internal.did
                    )));
                }
                MetaColumn::Field(field) if field.field_type.is_child() => {
                    let child_ref = table_ref.child(field.name.as_str());
                    let child = self.build_child(&child_ref, &row.internal, value)?;
                    document.insert(field.name.clone(), child);
                }
                MetaColumn::Field(field) => {
                    document.insert(field.name.clone(), value.clone());
                }
            }
        }
        Ok(document)
    }

    fn build_child(&self, child_ref: &TableRef, parent: &InternalFields, marker: &KvValue) -> Result<KvValue> {
        match marker {
            KvValue::Boolean(true) => Ok(KvValue::Array(self.build_array(child_ref, parent.did, parent.rid)?)),
            KvValue::Boolean(false) => {
                let view = self.views.get(child_ref);
                let rows = view
                    .and_then(|view| view.by_parent.get(&(parent.did, parent.rid)))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                match (view, rows) {
                    (Some(view), [row]) => Ok(KvValue::Document(self.build_object(child_ref, view, row)?)),
                    (_, []) => Err(integrity(format!(
                        "object {} of row {} in document {} has no row",
                        child_ref, parent.rid, parent.did
                    ))),
                    _ => Err(integrity(format!(
                        "object {} of row {} in document {} has {} rows",
                        child_ref,
                        parent.rid,
                        parent.did,
                        rows.len()
                    ))),
                }
            }
            other => Err(integrity(format!(
                "child marker of {} holds {} instead of a boolean",
                child_ref, other
            ))),
        }
    }

    fn build_array(&self, table_ref: &TableRef, did: i32, pid: i32) -> Result<Vec<KvValue>> {
        let Some(view) = self.views.get(table_ref) else {
            return Ok(Vec::new());
        };
        let Some(rows) = view.by_parent.get(&(did, pid)) else {
            return Ok(Vec::new());
        };

        let mut rows = rows.clone();
        rows.sort_by_key(|row| row.internal.seq);

        let mut elements = Vec::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            if row.internal.seq != i32::try_from(position).ok() {
                return Err(integrity(format!(
                    "array {} of row {} in document {} expected seq {} but found {:?}",
                    table_ref, pid, did, position, row.internal.seq
                )));
            }
            elements.push(self.build_element(table_ref, view, row)?);
        }
        Ok(elements)
    }

    fn build_element(&self, table_ref: &TableRef, view: &PartView<'r, 'm>, row: &ReadRow) -> Result<KvValue> {
        let scalar = row
            .values
            .iter()
            .find(|(index, _)| matches!(view.columns[*index], MetaColumn::Scalar(_)));

        match scalar {
            Some((index, value)) if view.columns[*index].field_type().is_child() => match value {
                KvValue::Boolean(true) => Ok(KvValue::Array(self.build_array(
                    &table_ref.nested_array_child(),
                    row.internal.did,
                    row.internal.rid,
                )?)),
                other => Err(integrity(format!(
                    "nested array marker of {} holds {}",
                    table_ref, other
                ))),
            },
            Some((_, value)) => Ok(value.clone()),
            None => Ok(KvValue::Document(self.build_object(table_ref, view, row)?)),
        }
    }
}
