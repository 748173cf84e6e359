//! Documents written through the D2R translator into the in-memory backend
//! and rebuilt by the R2D translator.

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use photondb_d2r::backend::memory::{MemoryR2DBackendTranslator, StoredRow};
use photondb_d2r::error::{DecodeError, Error, Result};
use photondb_d2r::r2d::R2DTranslator;
use photondb_d2r::{
    D2RTranslator, DefaultIdentifierConstraints, IdentifierFactory, KvDocument, KvValue, MemoryBackend,
    MetaSnapshot, ReservedIdGenerator, StorageBackend, TableRef, ToroDocument,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

const DATABASE: &str = "shop";
const COLLECTION: &str = "orders";

struct Harness {
    factory: IdentifierFactory,
    rids: ReservedIdGenerator,
    snapshot: MetaSnapshot,
    backend: MemoryBackend,
}

impl Harness {
    fn new() -> Self {
        Self {
            factory: IdentifierFactory::new(Arc::new(DefaultIdentifierConstraints::postgresql().unwrap())),
            rids: ReservedIdGenerator::new(),
            snapshot: MetaSnapshot::new(),
            backend: MemoryBackend::new(),
        }
    }

    async fn write(&mut self, documents: &[KvDocument]) -> Result<()> {
        let mut translator = D2RTranslator::new(
            &self.factory,
            &self.rids,
            &mut self.snapshot,
            DATABASE,
            COLLECTION,
        )?;
        for document in documents {
            translator.translate(document)?;
        }
        let data = translator.into_collection_data_accumulator();
        self.backend.write(&self.snapshot, &data).await
    }

    async fn read(&self) -> Result<Vec<ToroDocument>> {
        self.backend.read_documents(&self.snapshot, DATABASE, COLLECTION).await
    }

    fn table(&self, table_ref: &TableRef) -> (String, String) {
        let collection = self.snapshot.collection_by_name(DATABASE, COLLECTION).unwrap();
        let schema = self.snapshot.database(collection.database()).identifier().to_string();
        let part = collection.doc_part_by_table_ref(table_ref).unwrap();
        (schema, self.snapshot.doc_part(part).identifier().to_string())
    }
}

fn doc(value: Value) -> KvDocument {
    KvDocument::from(value)
}

#[tokio::test]
async fn test_object_and_array_rows() -> Result<()> {
    let mut harness = Harness::new();
    let document = doc(json!({"a": {"b": 1}, "c": [1, 2, 3]}));
    harness.write(&[document.clone()]).await?;

    let (schema, root_table) = harness.table(&TableRef::root());
    let (_, array_table) = harness.table(&TableRef::root().child("c"));
    assert_eq!(root_table, "orders");
    assert_eq!(array_table, "orders_c");

    let root_rows = harness.backend.rows(&schema, &root_table);
    assert_eq!(root_rows.len(), 1);
    let root = &root_rows[0];
    assert_eq!(root.cells.get("a_e"), Some(&json!(false)));
    assert_eq!(root.cells.get("c_e"), Some(&json!(true)));

    let array_rows = harness.backend.rows(&schema, &array_table);
    assert_eq!(array_rows.len(), 3);
    for (index, row) in array_rows.iter().enumerate() {
        assert_eq!(row.did, root.did);
        assert_eq!(row.pid, root.rid);
        assert_eq!(row.seq, Some(index as i32));
        assert_eq!(row.cells.get("v_i"), Some(&json!(index + 1)));
    }

    let documents = harness.read().await?;
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].root, document);
    Ok(())
}

#[tokio::test]
async fn test_every_value_type() -> Result<()> {
    let mut harness = Harness::new();
    let mut document = KvDocument::new();
    document.insert("null", KvValue::Null);
    document.insert("flag", KvValue::Boolean(true));
    document.insert("small", KvValue::Integer(-7));
    document.insert("big", KvValue::Long(1 << 40));
    document.insert("ratio", KvValue::Double(0.25));
    document.insert("name", KvValue::from("pen"));
    document.insert("blob", KvValue::Binary(vec![0, 1, 254, 255]));
    document.insert("day", KvValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    document.insert(
        "clock",
        KvValue::Time(NaiveTime::from_hms_milli_opt(10, 11, 12, 500).unwrap()),
    );
    document.insert(
        "at",
        KvValue::Instant(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()),
    );
    document.insert("oid", KvValue::ObjectId([0x5f; 12]));
    document.insert(
        "ts",
        KvValue::Timestamp {
            seconds: 1_700_000_000,
            ordinal: 3,
        },
    );
    document.insert("empty_object", KvValue::Document(KvDocument::new()));
    document.insert("empty_array", KvValue::Array(Vec::new()));

    harness.write(&[document.clone()]).await?;
    let documents = harness.read().await?;
    assert_eq!(documents[0].root, document);
    Ok(())
}

#[tokio::test]
async fn test_heterogeneous_and_nested_arrays() -> Result<()> {
    let mut harness = Harness::new();
    let document = doc(json!({
        "mixed": [1, "two", null, {"x": 3}, [4, [5]], {}, []],
        "matrix": [[1, 2], [], [[3]]],
        "lines": [{"sku": "a", "tags": ["x", "y"]}, {"sku": "b", "tags": []}]
    }));
    harness.write(&[document.clone()]).await?;

    let documents = harness.read().await?;
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].root, document);
    assert_eq!(documents[0].to_json(), json!({
        "mixed": [1, "two", null, {"x": 3}, [4, [5]], {}, []],
        "matrix": [[1, 2], [], [[3]]],
        "lines": [{"sku": "a", "tags": ["x", "y"]}, {"sku": "b", "tags": []}]
    }));
    Ok(())
}

#[tokio::test]
async fn test_names_normalizing_alike_get_distinct_tables() -> Result<()> {
    let mut harness = Harness::new();
    let document = doc(json!({"Items": {"x": 1}, "items": {"y": 2}}));
    harness.write(&[document.clone()]).await?;

    let (_, upper) = harness.table(&TableRef::root().child("Items"));
    let (_, lower) = harness.table(&TableRef::root().child("items"));
    assert_eq!(upper, "orders_items");
    assert_eq!(lower, "orders_items_1");

    let documents = harness.read().await?;
    assert_eq!(documents[0].root, document);
    Ok(())
}

#[tokio::test]
async fn test_many_documents_keep_order_and_dids() -> Result<()> {
    let mut harness = Harness::new();
    let documents: Vec<KvDocument> = (0..5)
        .map(|n| doc(json!({"n": n, "items": vec![n; n as usize]})))
        .collect();
    harness.write(&documents).await?;

    let read = harness.read().await?;
    assert_eq!(read.len(), 5);
    for (n, document) in read.iter().enumerate() {
        assert_eq!(document.did, n as i32);
        assert_eq!(document.root, documents[n]);
    }
    Ok(())
}

#[tokio::test]
async fn test_recovered_counters_do_not_reuse_rids() -> Result<()> {
    let mut harness = Harness::new();
    harness
        .write(&[doc(json!({"tags": ["a", "b"]})), doc(json!({"tags": ["c"]}))])
        .await?;

    // A restarted process starts with fresh counters.
    harness.rids = ReservedIdGenerator::new();
    let marks = harness.backend.rid_high_water_marks(&harness.snapshot).await?;
    harness.rids.recover(marks)?;
    harness.write(&[doc(json!({"tags": ["d"]}))]).await?;

    let (schema, table) = harness.table(&TableRef::root().child("tags"));
    let rids: Vec<Option<i32>> = harness.backend.rows(&schema, &table).iter().map(|row| row.rid).collect();
    assert_eq!(rids, vec![Some(0), Some(1), Some(2), Some(3)]);

    let documents = harness.read().await?;
    let dids: Vec<i32> = documents.iter().map(|document| document.did).collect();
    assert_eq!(dids, vec![0, 1, 2]);
    assert_eq!(documents[2].root, doc(json!({"tags": ["d"]})));
    Ok(())
}

#[tokio::test]
async fn test_write_during_read_rolls_back() -> Result<()> {
    let mut harness = Harness::new();
    harness.write(&[doc(json!({"a": 1}))]).await?;

    let cursors = harness.backend.open_cursors(&harness.snapshot, DATABASE, COLLECTION)?;
    let (schema, table) = harness.table(&TableRef::root());
    harness.backend.insert_row(
        &schema,
        &table,
        StoredRow {
            did: Some(9),
            rid: Some(9),
            pid: None,
            seq: None,
            cells: HashMap::new(),
        },
    );

    let err = R2DTranslator::new(MemoryR2DBackendTranslator)
        .translate(cursors)
        .unwrap_err();
    assert!(matches!(err, Error::Rollback(_)));
    assert!(err.is_retryable());

    // A fresh read sees both documents.
    assert_eq!(harness.read().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_null_did_is_integrity_fault() -> Result<()> {
    let mut harness = Harness::new();
    harness.write(&[doc(json!({"a": 1}))]).await?;
    let (schema, table) = harness.table(&TableRef::root());
    harness.backend.insert_row(
        &schema,
        &table,
        StoredRow {
            did: None,
            rid: Some(5),
            pid: None,
            seq: None,
            cells: HashMap::new(),
        },
    );

    let err = harness.read().await.unwrap_err();
    assert!(matches!(err, Error::DataIntegrity(_)));
    assert!(!err.is_retryable());
    Ok(())
}

#[tokio::test]
async fn test_null_pid_in_child_is_integrity_fault() -> Result<()> {
    let mut harness = Harness::new();
    harness.write(&[doc(json!({"c": [1]}))]).await?;
    let (schema, table) = harness.table(&TableRef::root().child("c"));
    harness.backend.insert_row(
        &schema,
        &table,
        StoredRow {
            did: Some(0),
            rid: Some(7),
            pid: None,
            seq: Some(1),
            cells: HashMap::new(),
        },
    );

    assert!(matches!(harness.read().await, Err(Error::DataIntegrity(_))));
    Ok(())
}

#[tokio::test]
async fn test_malformed_cell_is_decode_error() -> Result<()> {
    let mut harness = Harness::new();
    harness.write(&[doc(json!({"qty": 1}))]).await?;
    let (schema, table) = harness.table(&TableRef::root());
    harness.backend.insert_row(
        &schema,
        &table,
        StoredRow {
            did: Some(1),
            rid: Some(1),
            pid: None,
            seq: None,
            cells: HashMap::from([("qty_i".to_string(), json!("seven"))]),
        },
    );

    let err = harness.read().await.unwrap_err();
    assert!(matches!(err, Error::Decode(DecodeError::Malformed { .. })));
    Ok(())
}

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        (-1.0e6f64..1.0e6).prop_map(|d| json!(d)),
        "[a-z ]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z_]{1,6}", inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

fn json_document() -> impl Strategy<Value = KvDocument> {
    prop::collection::btree_map("[a-zA-Z_]{1,6}", json_value(), 0..5)
        .prop_map(|fields| KvDocument::from(Value::Object(fields.into_iter().collect())))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_documents_survive_round_trip(documents in prop::collection::vec(json_document(), 1..4)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let read = runtime.block_on(async {
            let mut harness = Harness::new();
            harness.write(&documents).await?;
            harness.read().await
        }).unwrap();

        prop_assert_eq!(read.len(), documents.len());
        for (rebuilt, original) in read.iter().zip(&documents) {
            prop_assert_eq!(&rebuilt.root, original);
        }
    }
}
