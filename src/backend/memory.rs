//! In-memory storage backend
//!
//! Keeps every doc-part table as a vector of rows keyed by
//! `(schema identifier, table identifier)`. Cells are stored in the JSON
//! encoding a relational driver would hand back, so reads go through the
//! same per-type decoding a real backend needs.

use crate::backend::StorageBackend;
use crate::d2r::{CollectionDataAccumulator, DocPartRow, InternalFields};
use crate::document::value::{format_object_id, parse_object_id};
use crate::document::{FieldType, KvValue, ToroDocument};
use crate::error::{DecodeError, Error, Result};
use crate::meta::{MetaDocPart, MetaSnapshot};
use crate::r2d::{DocPartResult, R2DBackendTranslator, R2DTranslator};
use crate::rid::RidMark;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// One stored row. Linkage columns are nullable the way SQL columns are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub did: Option<i32>,
    pub rid: Option<i32>,
    pub pid: Option<i32>,
    pub seq: Option<i32>,
    /// Column identifier to encoded value; absent columns are nulls.
    pub cells: HashMap<String, Value>,
}

type TableKey = (String, String);

/// In-memory storage backend
#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<HashMap<TableKey, Vec<StoredRow>>>>,
    epoch: Arc<AtomicU64>,
}

impl MemoryBackend {
    /// Create a new empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables holding at least one row
    pub fn table_count(&self) -> usize {
        self.tables.lock().len()
    }

    /// Copy of the rows of one table
    pub fn rows(&self, schema: &str, table: &str) -> Vec<StoredRow> {
        self.tables
            .lock()
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Append a raw row, bypassing the encoder.
    pub fn insert_row(&self, schema: &str, table: &str, row: StoredRow) {
        self.tables
            .lock()
            .entry((schema.to_string(), table.to_string()))
            .or_default()
            .push(row);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Open one cursor per doc part of `database.collection`, parents first.
    ///
    /// Cursors fail with [`Error::Rollback`] once any write lands after they
    /// were opened.
    pub fn open_cursors<'m>(
        &self,
        snapshot: &'m MetaSnapshot,
        database: &str,
        collection: &str,
    ) -> Result<Vec<DocPartResult<'m, MemoryCursor>>> {
        let meta_collection = snapshot
            .collection_by_name(database, collection)
            .ok_or_else(|| Error::NotFound(format!("collection {}.{}", database, collection)))?;
        let schema = snapshot.database(meta_collection.database()).identifier().to_string();

        let mut doc_parts: Vec<&'m MetaDocPart> = snapshot.doc_parts_of(meta_collection.handle()).collect();
        doc_parts.sort_by_key(|doc_part| doc_part.table_ref().depth());

        let tables = self.tables.lock();
        let opened_epoch = self.epoch.load(Ordering::Acquire);
        let cursors = doc_parts
            .into_iter()
            .map(|doc_part| {
                let rows = tables
                    .get(&(schema.clone(), doc_part.identifier().to_string()))
                    .cloned()
                    .unwrap_or_default();
                let cursor = MemoryCursor {
                    rows,
                    columns: doc_part
                        .columns()
                        .map(|column| column.identifier().to_string())
                        .collect(),
                    position: None,
                    opened_epoch,
                    epoch: Arc::clone(&self.epoch),
                };
                DocPartResult::new(doc_part, cursor)
            })
            .collect();
        Ok(cursors)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn write(&self, snapshot: &MetaSnapshot, data: &CollectionDataAccumulator) -> Result<()> {
        let meta_collection = snapshot
            .collection_by_name(data.database(), data.collection())
            .ok_or_else(|| {
                Error::NotFound(format!("collection {}.{}", data.database(), data.collection()))
            })?;
        let schema = snapshot.database(meta_collection.database()).identifier().to_string();

        let mut encoded = Vec::with_capacity(data.doc_parts().len());
        for part in data.doc_parts() {
            let doc_part = snapshot.doc_part(part.handle());
            let rows = part
                .rows()
                .iter()
                .map(|row| encode_row(doc_part, row))
                .collect::<Result<Vec<_>>>()?;
            encoded.push((doc_part.identifier().to_string(), rows));
        }

        let mut tables = self.tables.lock();
        for (table, rows) in encoded {
            debug!(schema = %schema, table = %table, rows = rows.len(), "Writing doc part rows");
            tables.entry((schema.clone(), table)).or_default().extend(rows);
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn read_documents(
        &self,
        snapshot: &MetaSnapshot,
        database: &str,
        collection: &str,
    ) -> Result<Vec<ToroDocument>> {
        let cursors = self.open_cursors(snapshot, database, collection)?;
        R2DTranslator::new(MemoryR2DBackendTranslator).translate(cursors)
    }

    async fn rid_high_water_marks(&self, snapshot: &MetaSnapshot) -> Result<Vec<RidMark>> {
        let tables = self.tables.lock();
        let mut marks = Vec::new();
        for database in snapshot.databases() {
            for collection in database.collections() {
                let meta_collection = snapshot.collection(*collection);
                for doc_part in snapshot.doc_parts_of(*collection) {
                    let key = (database.identifier().to_string(), doc_part.identifier().to_string());
                    let last_rid = tables
                        .get(&key)
                        .and_then(|rows| rows.iter().filter_map(|row| row.rid).max());
                    if let Some(last_rid) = last_rid {
                        marks.push(RidMark {
                            database: database.name().to_string(),
                            collection: meta_collection.name().to_string(),
                            table_ref: doc_part.table_ref().clone(),
                            last_rid,
                        });
                    }
                }
            }
        }
        Ok(marks)
    }
}

fn encode_row(doc_part: &MetaDocPart, row: &DocPartRow) -> Result<StoredRow> {
    let mut cells = HashMap::new();
    for (position, scalar) in doc_part.scalars().iter().enumerate() {
        if let Some(value) = row.scalar(position) {
            cells.insert(scalar.identifier.clone(), encode_value(value)?);
        }
    }
    for (position, field) in doc_part.fields().iter().enumerate() {
        if let Some(value) = row.field(position) {
            cells.insert(field.identifier.clone(), encode_value(value)?);
        }
    }
    Ok(StoredRow {
        did: Some(row.internal.did),
        rid: Some(row.internal.rid),
        pid: row.internal.pid,
        seq: row.internal.seq,
        cells,
    })
}

fn encode_value(value: &KvValue) -> Result<Value> {
    let cell = match value {
        // A null-typed column only records presence.
        KvValue::Null => Value::Bool(true),
        KvValue::Boolean(b) => Value::Bool(*b),
        KvValue::Integer(i) => json!(i),
        KvValue::Long(l) => json!(l),
        KvValue::Double(d) if d.is_finite() => json!(d),
        KvValue::Double(d) => Value::String(d.to_string()),
        KvValue::String(s) => Value::String(s.clone()),
        KvValue::Binary(bytes) => Value::String(BASE64.encode(bytes)),
        KvValue::Date(date) => Value::String(date.format(DATE_FORMAT).to_string()),
        KvValue::Time(time) => Value::String(time.format(TIME_FORMAT).to_string()),
        KvValue::Instant(instant) => Value::String(instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        KvValue::ObjectId(bytes) => Value::String(format_object_id(bytes)),
        KvValue::Timestamp { seconds, ordinal } => json!({"t": seconds, "i": ordinal}),
        KvValue::Array(_) | KvValue::Document(_) => {
            return Err(Error::InvalidArgument(format!(
                "{} cannot be stored in a column",
                value.field_type()
            )))
        }
    };
    Ok(cell)
}

fn malformed(field_type: FieldType, cell: &Value) -> DecodeError {
    DecodeError::Malformed {
        field_type,
        reason: format!("unexpected cell {}", cell),
    }
}

fn decode_value(field_type: FieldType, cell: &Value) -> std::result::Result<KvValue, DecodeError> {
    let bad = || malformed(field_type, cell);
    let value = match field_type {
        FieldType::Null => KvValue::Null,
        FieldType::Boolean | FieldType::Child => KvValue::Boolean(cell.as_bool().ok_or_else(bad)?),
        FieldType::Integer => {
            let wide = cell.as_i64().ok_or_else(bad)?;
            KvValue::Integer(i32::try_from(wide).map_err(|_| bad())?)
        }
        FieldType::Long => KvValue::Long(cell.as_i64().ok_or_else(bad)?),
        FieldType::Double => match cell {
            Value::Number(n) => KvValue::Double(n.as_f64().ok_or_else(bad)?),
            Value::String(s) => KvValue::Double(s.parse().map_err(|_| bad())?),
            _ => return Err(bad()),
        },
        FieldType::String => KvValue::String(cell.as_str().ok_or_else(bad)?.to_string()),
        FieldType::Binary => {
            let text = cell.as_str().ok_or_else(bad)?;
            KvValue::Binary(BASE64.decode(text).map_err(|_| bad())?)
        }
        FieldType::Date => {
            let text = cell.as_str().ok_or_else(bad)?;
            KvValue::Date(NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| bad())?)
        }
        FieldType::Time => {
            let text = cell.as_str().ok_or_else(bad)?;
            KvValue::Time(NaiveTime::parse_from_str(text, TIME_FORMAT).map_err(|_| bad())?)
        }
        FieldType::Instant => {
            let text = cell.as_str().ok_or_else(bad)?;
            let instant = DateTime::parse_from_rfc3339(text).map_err(|_| bad())?;
            KvValue::Instant(instant.with_timezone(&Utc))
        }
        FieldType::MongoObjectId => {
            let text = cell.as_str().ok_or_else(bad)?;
            KvValue::ObjectId(parse_object_id(text).ok_or_else(bad)?)
        }
        FieldType::MongoTimestamp => {
            let part = |key: &str| {
                cell.get(key)
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(bad)
            };
            KvValue::Timestamp {
                seconds: part("t")?,
                ordinal: part("i")?,
            }
        }
    };
    Ok(value)
}

/// Snapshot of one table taken when the cursor was opened.
#[derive(Debug)]
pub struct MemoryCursor {
    rows: Vec<StoredRow>,
    columns: Vec<String>,
    position: Option<usize>,
    opened_epoch: u64,
    epoch: Arc<AtomicU64>,
}

impl MemoryCursor {
    fn current(&self) -> Result<&StoredRow> {
        self.position
            .and_then(|position| self.rows.get(position))
            .ok_or_else(|| Error::InvalidArgument("cursor is not positioned on a row".to_string()))
    }
}

/// Cursor adapter of [`MemoryBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryR2DBackendTranslator;

impl R2DBackendTranslator for MemoryR2DBackendTranslator {
    type Cursor = MemoryCursor;

    fn next(&self, cursor: &mut MemoryCursor) -> Result<bool> {
        let epoch = cursor.epoch.load(Ordering::Acquire);
        if epoch != cursor.opened_epoch {
            warn!(opened = cursor.opened_epoch, current = epoch, "Concurrent write invalidated cursor");
            return Err(Error::Rollback(
                "tables were modified while being read".to_string(),
            ));
        }
        let next = cursor.position.map_or(0, |position| position + 1);
        cursor.position = Some(next);
        Ok(next < cursor.rows.len())
    }

    fn read_internal_fields(&self, doc_part: &MetaDocPart, cursor: &MemoryCursor) -> Result<InternalFields> {
        let row = cursor.current()?;
        let (Some(did), Some(rid)) = (row.did, row.rid) else {
            return Err(Error::DataIntegrity(format!(
                "row of {} has a null did or rid",
                doc_part.identifier()
            )));
        };
        if row.pid.is_none() && !doc_part.table_ref().is_root() {
            return Err(Error::DataIntegrity(format!(
                "row {} of document {} in {} has a null pid",
                rid,
                did,
                doc_part.identifier()
            )));
        }
        Ok(InternalFields {
            did,
            rid,
            pid: row.pid,
            seq: row.seq,
        })
    }

    fn get_value(
        &self,
        field_type: FieldType,
        cursor: &MemoryCursor,
        _internal: &InternalFields,
        field_index: usize,
    ) -> Result<Option<KvValue>> {
        let row = cursor.current()?;
        let column = cursor.columns.get(field_index).ok_or_else(|| {
            Error::InvalidArgument(format!("column index {} out of range", field_index))
        })?;
        match row.cells.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(cell) => Ok(Some(decode_value(field_type, cell)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::constraints::DefaultIdentifierConstraints;
    use crate::d2r::D2RTranslator;
    use crate::document::KvDocument;
    use crate::identifier::IdentifierFactory;
    use crate::rid::ReservedIdGenerator;
    use serde_json::json;

    fn write_documents(
        snapshot: &mut MetaSnapshot,
        rids: &ReservedIdGenerator,
        documents: Vec<Value>,
    ) -> Result<CollectionDataAccumulator> {
        let factory = IdentifierFactory::new(Arc::new(DefaultIdentifierConstraints::postgresql()?));
        let mut translator = D2RTranslator::new(&factory, rids, snapshot, "shop", "orders")?;
        for document in documents {
            translator.translate(&KvDocument::from(document))?;
        }
        Ok(translator.into_collection_data_accumulator())
    }

    #[tokio::test]
    async fn test_write_and_read() -> Result<()> {
        let backend = MemoryBackend::new();
        let rids = ReservedIdGenerator::new();
        let mut snapshot = MetaSnapshot::new();
        let data = write_documents(&mut snapshot, &rids, vec![json!({"item": "pen", "qty": 2})])?;
        backend.write(&snapshot, &data).await?;

        let rows = backend.rows("shop", "orders");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells.get("item_s"), Some(&json!("pen")));

        let documents = backend.read_documents(&snapshot, "shop", "orders").await?;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].root.get("qty"), Some(&KvValue::Integer(2)));
        Ok(())
    }

    #[tokio::test]
    async fn test_high_water_marks() -> Result<()> {
        let backend = MemoryBackend::new();
        let rids = ReservedIdGenerator::new();
        let mut snapshot = MetaSnapshot::new();
        let data = write_documents(
            &mut snapshot,
            &rids,
            vec![json!({"tags": ["a", "b"]}), json!({"tags": ["c"]})],
        )?;
        backend.write(&snapshot, &data).await?;

        let mut marks = backend.rid_high_water_marks(&snapshot).await?;
        marks.sort_by_key(|mark| mark.table_ref.depth());
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].last_rid, 1);
        assert_eq!(marks[1].last_rid, 2);
        assert_eq!(marks[1].table_ref.name(), "tags");
        Ok(())
    }

    #[test]
    fn test_special_doubles_survive_encoding() {
        let cell = encode_value(&KvValue::Double(f64::NEG_INFINITY)).unwrap();
        assert_eq!(
            decode_value(FieldType::Double, &cell).unwrap(),
            KvValue::Double(f64::NEG_INFINITY)
        );
        let cell = encode_value(&KvValue::Double(f64::NAN)).unwrap();
        match decode_value(FieldType::Double, &cell).unwrap() {
            KvValue::Double(d) => assert!(d.is_nan()),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_cell() {
        let err = decode_value(FieldType::Integer, &json!("seven")).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { field_type: FieldType::Integer, .. }));
        assert!(decode_value(FieldType::Integer, &json!(i64::MAX)).is_err());
        assert!(decode_value(FieldType::MongoObjectId, &json!("xyz")).is_err());
    }

    #[test]
    fn test_containers_are_not_cells() {
        assert!(matches!(
            encode_value(&KvValue::Array(Vec::new())),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_collection() -> Result<()> {
        let backend = MemoryBackend::new();
        let snapshot = MetaSnapshot::new();
        let result = backend.read_documents(&snapshot, "shop", "missing").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        Ok(())
    }
}
