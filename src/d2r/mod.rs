//! Document to relational translation
//!
//! A document is split into one row per object and one row per array element.
//! Rows are grouped by doc part, the table holding everything found at one
//! [`TableRef`] of the collection:
//!
//! ```text
//! {"a": {"b": 1}, "c": [1, 2, 3]}
//!
//! orders       did=0 rid=0               a_e=false c_e=true
//! orders_a     did=0 rid=0 pid=0         b_i=1
//! orders_c     did=0 rid=0 pid=0 seq=0   v_i=1
//!              did=0 rid=1 pid=0 seq=1   v_i=2
//!              did=0 rid=2 pid=0 seq=2   v_i=3
//! ```
//!
//! Object and array fields leave a CHILD column (`<field>_e`) in their parent
//! row: `false` for an object, `true` for an array. Array elements that are
//! arrays themselves set the scalar CHILD column `v_e` and continue in the
//! next array dimension. Objects inside arrays are the element row itself.
//!
//! Translation performs no I/O. New databases, collections, doc parts and
//! columns are registered in the metadata snapshot passed in, with
//! identifiers minted by the [`IdentifierFactory`].

mod accumulator;

pub use accumulator::{CollectionDataAccumulator, DocPartData, DocPartRow, InternalFields};

use crate::document::{FieldType, KvDocument, KvValue};
use crate::error::{Error, Result};
use crate::identifier::IdentifierFactory;
use crate::meta::{CollectionHandle, DatabaseHandle, DocPartHandle, MetaSnapshot};
use crate::rid::{DocPartRidGenerator, ReservedIdGenerator};
use crate::table_ref::TableRef;
use std::sync::Arc;
use tracing::{debug, trace};

/// Splits documents of one collection into doc-part rows.
pub struct D2RTranslator<'a> {
    factory: &'a IdentifierFactory,
    rids: Arc<DocPartRidGenerator>,
    snapshot: &'a mut MetaSnapshot,
    database: DatabaseHandle,
    collection: CollectionHandle,
    accumulator: CollectionDataAccumulator,
    // Doc parts and rows of the document being translated, in emission order.
    staged_parts: Vec<(DocPartHandle, TableRef)>,
    staged_rows: Vec<(DocPartHandle, TableRef, DocPartRow)>,
}

impl<'a> D2RTranslator<'a> {
    /// Create a translator for `database.collection`, registering both in
    /// `snapshot` when they are new.
    pub fn new(
        factory: &'a IdentifierFactory,
        rid_generator: &ReservedIdGenerator,
        snapshot: &'a mut MetaSnapshot,
        database: &str,
        collection: &str,
    ) -> Result<Self> {
        let existing = snapshot.database_by_name(database).map(|db| db.handle());
        let database_handle = match existing {
            Some(handle) => handle,
            None => {
                let identifier = factory.database_identifier(snapshot, database)?;
                debug!(database, identifier = %identifier, "Creating database");
                snapshot.add_database(database, &identifier)?
            }
        };

        let existing = snapshot
            .database(database_handle)
            .collection_by_name(collection);
        let collection_handle = match existing {
            Some(handle) => handle,
            None => {
                let identifier = factory.collection_identifier(snapshot, database, collection)?;
                debug!(database, collection, identifier = %identifier, "Creating collection");
                snapshot.add_collection(database_handle, collection, &identifier)?
            }
        };

        Ok(Self {
            factory,
            rids: rid_generator.get_doc_part_rid_generator(database, collection),
            snapshot,
            database: database_handle,
            collection: collection_handle,
            accumulator: CollectionDataAccumulator::new(database, collection),
            staged_parts: Vec::new(),
            staged_rows: Vec::new(),
        })
    }

    /// Decompose one document into the accumulator.
    ///
    /// On error the accumulator is left as it was before the call.
    pub fn translate(&mut self, document: &KvDocument) -> Result<()> {
        self.staged_parts.clear();
        self.staged_rows.clear();

        let result = self.stage_document(document);
        let parts = std::mem::take(&mut self.staged_parts);
        let rows = std::mem::take(&mut self.staged_rows);
        result?;

        for (handle, table_ref) in &parts {
            self.accumulator.register(*handle, table_ref);
        }
        for (handle, table_ref, row) in rows {
            self.accumulator.push_row(handle, &table_ref, row);
        }
        self.accumulator.document_added();
        Ok(())
    }

    fn stage_document(&mut self, document: &KvDocument) -> Result<()> {
        let root = TableRef::root();
        let part = self.ensure_doc_part(&root)?;
        let did = self.rids.next_rid(&root)?;
        self.write_document(&root, part, InternalFields::root(did), document)
    }

    pub fn collection_data_accumulator(&self) -> &CollectionDataAccumulator {
        &self.accumulator
    }

    pub fn into_collection_data_accumulator(self) -> CollectionDataAccumulator {
        self.accumulator
    }

    fn write_document(
        &mut self,
        table_ref: &TableRef,
        part: DocPartHandle,
        internal: InternalFields,
        document: &KvDocument,
    ) -> Result<()> {
        let mut row = DocPartRow::new(internal);
        for (key, value) in document.iter() {
            let position = self.ensure_field(part, key, value.field_type())?;
            match value {
                KvValue::Document(child) => {
                    row.set_field(position, KvValue::Boolean(false));
                    let child_ref = table_ref.child(key);
                    let child_part = self.ensure_doc_part(&child_ref)?;
                    let child_internal = InternalFields {
                        did: internal.did,
                        rid: self.rids.next_rid(&child_ref)?,
                        pid: Some(internal.rid),
                        seq: None,
                    };
                    self.write_document(&child_ref, child_part, child_internal, child)?;
                }
                KvValue::Array(items) => {
                    row.set_field(position, KvValue::Boolean(true));
                    self.write_array(&table_ref.child(key), internal.did, internal.rid, items)?;
                }
                scalar => row.set_field(position, scalar.clone()),
            }
        }
        self.emit(table_ref, part, row);
        Ok(())
    }

    fn write_array(&mut self, table_ref: &TableRef, did: i32, pid: i32, items: &[KvValue]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let part = self.ensure_doc_part(table_ref)?;
        for (index, item) in items.iter().enumerate() {
            let seq = i32::try_from(index).map_err(|_| {
                Error::InvalidArgument(format!("array {} has too many elements", table_ref))
            })?;
            let internal = InternalFields {
                did,
                rid: self.rids.next_rid(table_ref)?,
                pid: Some(pid),
                seq: Some(seq),
            };

            match item {
                KvValue::Document(document) => {
                    self.write_document(table_ref, part, internal, document)?;
                }
                KvValue::Array(inner) => {
                    let position = self.ensure_scalar(part, FieldType::Child)?;
                    let mut row = DocPartRow::new(internal);
                    row.set_scalar(position, KvValue::Boolean(true));
                    self.emit(table_ref, part, row);
                    self.write_array(&table_ref.nested_array_child(), did, internal.rid, inner)?;
                }
                scalar => {
                    let position = self.ensure_scalar(part, scalar.field_type())?;
                    let mut row = DocPartRow::new(internal);
                    row.set_scalar(position, scalar.clone());
                    self.emit(table_ref, part, row);
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, table_ref: &TableRef, part: DocPartHandle, row: DocPartRow) {
        trace!(
            table_ref = %table_ref,
            did = row.internal.did,
            rid = row.internal.rid,
            pid = ?row.internal.pid,
            seq = ?row.internal.seq,
            "Emitted row"
        );
        self.staged_rows.push((part, table_ref.clone(), row));
    }

    fn ensure_doc_part(&mut self, table_ref: &TableRef) -> Result<DocPartHandle> {
        let existing = self
            .snapshot
            .collection(self.collection)
            .doc_part_by_table_ref(table_ref);
        let handle = match existing {
            Some(handle) => handle,
            None => {
                let collection = self.snapshot.collection(self.collection).name().to_string();
                let identifier = self.factory.doc_part_identifier(
                    self.snapshot.database(self.database),
                    &collection,
                    table_ref,
                )?;
                debug!(table_ref = %table_ref, identifier = %identifier, "Creating doc part");
                self.snapshot
                    .add_doc_part(self.collection, table_ref.clone(), &identifier)?
            }
        };
        self.staged_parts.push((handle, table_ref.clone()));
        Ok(handle)
    }

    fn ensure_field(&mut self, part: DocPartHandle, name: &str, field_type: FieldType) -> Result<usize> {
        let doc_part = self.snapshot.doc_part(part);
        if let Some(position) = doc_part.field_position(name, field_type) {
            return Ok(position);
        }
        let identifier = self.factory.field_identifier(doc_part, name, field_type)?;
        debug!(
            doc_part = %doc_part.identifier(),
            field = name,
            field_type = %field_type,
            identifier = %identifier,
            "Creating field"
        );
        self.snapshot.add_field(part, name, field_type, &identifier)
    }

    fn ensure_scalar(&mut self, part: DocPartHandle, field_type: FieldType) -> Result<usize> {
        if let Some(position) = self.snapshot.doc_part(part).scalar_position(field_type) {
            return Ok(position);
        }
        let identifier = self.factory.scalar_field_identifier(field_type);
        self.snapshot.add_scalar(part, field_type, &identifier)
    }
}
