//! Identifier generation against a 128 character backend that refuses every
//! name starting with `unallowed`.

use photondb_d2r::backend::constraints::{DefaultIdentifierConstraints, IdentifierConstraints};
use photondb_d2r::error::Error;
use photondb_d2r::meta::{DocPartHandle, MetaSnapshot};
use photondb_d2r::{FieldType, GenerationBudget, IdentifierFactory, TableRef};
use proptest::prelude::*;
use std::sync::Arc;

struct RestrictiveConstraints {
    inner: DefaultIdentifierConstraints,
}

impl RestrictiveConstraints {
    fn new() -> Self {
        Self {
            inner: DefaultIdentifierConstraints::new(128, Vec::<String>::new(), Vec::<String>::new()).unwrap(),
        }
    }
}

fn allowed(identifier: &str) -> bool {
    !identifier.starts_with("unallowed")
}

impl IdentifierConstraints for RestrictiveConstraints {
    fn separator(&self) -> char {
        self.inner.separator()
    }

    fn array_dimension_separator(&self) -> char {
        self.inner.array_dimension_separator()
    }

    fn identifier_max_size(&self) -> usize {
        self.inner.identifier_max_size()
    }

    fn is_allowed_schema_identifier(&self, identifier: &str) -> bool {
        allowed(identifier)
    }

    fn is_allowed_table_identifier(&self, identifier: &str) -> bool {
        allowed(identifier)
    }

    fn is_allowed_column_identifier(&self, identifier: &str) -> bool {
        allowed(identifier)
    }

    fn is_allowed_index_identifier(&self, identifier: &str) -> bool {
        allowed(identifier)
    }

    fn field_type_identifier(&self, field_type: FieldType) -> char {
        self.inner.field_type_identifier(field_type)
    }

    fn scalar_identifier(&self, field_type: FieldType) -> String {
        self.inner.scalar_identifier(field_type)
    }
}

fn factory() -> IdentifierFactory {
    IdentifierFactory::new(Arc::new(RestrictiveConstraints::new()))
}

fn longs(prefix: &str, count: usize) -> String {
    let mut name = prefix.to_string();
    for _ in 0..count {
        name.push_str("_long");
    }
    name
}

/// Snapshot with database `database` holding collection `collecti`.
fn database_snapshot() -> MetaSnapshot {
    let mut snapshot = MetaSnapshot::new();
    let db = snapshot.add_database("database", "database").unwrap();
    snapshot.add_collection(db, "collecti", "collecti").unwrap();
    snapshot
}

fn doc_part_identifier(snapshot: &MetaSnapshot, table_ref: &TableRef) -> String {
    let database = snapshot.database_by_name("database").unwrap();
    factory().doc_part_identifier(database, "collecti", table_ref).unwrap()
}

/// Snapshot with a root doc part `docpart` to host fields.
fn doc_part_snapshot() -> (MetaSnapshot, DocPartHandle) {
    let mut snapshot = database_snapshot();
    let coll = snapshot.collection_by_name("database", "collecti").unwrap().handle();
    let part = snapshot.add_doc_part(coll, TableRef::root(), "docpart").unwrap();
    (snapshot, part)
}

const COUNTER_DATABASE_1: &str = "database_long_long_long_long_long_long_long_long_long_long_longong_long_long_long_long_long_long_long_long_long_long_long_long_1";
const COUNTER_DATABASE_2: &str = "database_long_long_long_long_long_long_long_long_long_long_longong_long_long_long_long_long_long_long_long_long_long_long_long_2";
const COUNTER_DOC_PART_1: &str = "collecti_long_long_long_long_long_long_long_long_long_long_longong_long_long_long_long_long_long_long_long_long_long_long_long_1";
const COUNTER_DOC_PART_2: &str = "collecti_long_long_long_long_long_long_long_long_long_long_longong_long_long_long_long_long_long_long_long_long_long_long_long_2";
const COUNTER_FIELD_1: &str = "field____long_long_long_long_long_long_long_long_long_long_lonng_long_long_long_long_long_long_long_long_long_long_long_long_1_s";
const COUNTER_FIELD_2: &str = "field____long_long_long_long_long_long_long_long_long_long_lonng_long_long_long_long_long_long_long_long_long_long_long_long_2_s";

#[test]
fn test_empty_database() {
    let snapshot = MetaSnapshot::new();
    assert_eq!(factory().database_identifier(&snapshot, "").unwrap(), "");
}

#[test]
fn test_unallowed_database() {
    let snapshot = MetaSnapshot::new();
    assert_eq!(
        factory().database_identifier(&snapshot, "unallowed_schema").unwrap(),
        "_unallowed_schema"
    );
}

#[test]
fn test_database() {
    let snapshot = MetaSnapshot::new();
    assert_eq!(factory().database_identifier(&snapshot, "database").unwrap(), "database");
}

#[test]
fn test_database_of_max_size_is_kept() {
    let snapshot = MetaSnapshot::new();
    let name = longs("database", 24);
    assert_eq!(name.len(), 128);
    assert_eq!(factory().database_identifier(&snapshot, &name).unwrap(), name);
}

#[test]
fn test_long_database_uses_counter() {
    let snapshot = MetaSnapshot::new();
    let identifier = factory().database_identifier(&snapshot, &longs("database", 25)).unwrap();
    assert_eq!(identifier, COUNTER_DATABASE_1);
    assert_eq!(identifier.len(), 128);
}

#[test]
fn test_long_database_counter_collision() {
    let mut snapshot = MetaSnapshot::new();
    snapshot.add_database("database_collider", COUNTER_DATABASE_1).unwrap();
    let identifier = factory().database_identifier(&snapshot, &longs("database", 32)).unwrap();
    assert_eq!(identifier, COUNTER_DATABASE_2);
}

#[test]
fn test_long_unallowed_database_leaves_room_for_prefix() {
    let snapshot = MetaSnapshot::new();
    let name = longs("unallowed", 24);
    assert_eq!(name.len(), 129);
    let identifier = factory().database_identifier(&snapshot, &name).unwrap();
    assert_eq!(
        identifier,
        "_unallowed_long_long_long_long_long_long_long_long_long_long_lonng_long_long_long_long_long_long_long_long_long_long_long_long_1"
    );
    assert_eq!(identifier.len(), 128);
}

#[test]
fn test_collection() {
    let snapshot = MetaSnapshot::new();
    assert_eq!(
        factory().collection_identifier(&snapshot, "database", "collection").unwrap(),
        "database_collection"
    );
}

#[test]
fn test_empty_collection_root_doc_part() {
    let snapshot = database_snapshot();
    let database = snapshot.database_by_name("database").unwrap();
    let identifier = factory().doc_part_identifier(database, "", &TableRef::root()).unwrap();
    assert_eq!(identifier, "");
}

#[test]
fn test_unallowed_collection_root_doc_part() {
    let snapshot = database_snapshot();
    let database = snapshot.database_by_name("database").unwrap();
    let identifier = factory()
        .doc_part_identifier(database, "unallowed_table", &TableRef::root())
        .unwrap();
    assert_eq!(identifier, "_unallowed_table");
}

#[test]
fn test_doc_part_paths() {
    let snapshot = database_snapshot();
    let root = TableRef::root();
    assert_eq!(doc_part_identifier(&snapshot, &root), "collecti");
    assert_eq!(doc_part_identifier(&snapshot, &root.child("object")), "collecti_object");
    assert_eq!(doc_part_identifier(&snapshot, &root.child("array")), "collecti_array");
    assert_eq!(
        doc_part_identifier(&snapshot, &root.child("array").array_child(2)),
        "collecti_array$2"
    );
    assert_eq!(
        doc_part_identifier(
            &snapshot,
            &root.child("object").child("array").array_child(2).child("object")
        ),
        "collecti_object_array$2_object"
    );
    assert_eq!(doc_part_identifier(&snapshot, &root.child("")), "collecti_");
}

#[test]
fn test_long_doc_parts() {
    let snapshot = database_snapshot();
    let fits = longs("long", 23);
    assert_eq!(
        doc_part_identifier(&snapshot, &TableRef::root().child(fits.as_str())),
        format!("collecti_{}", fits)
    );

    let too_long = longs("long", 24);
    assert_eq!(
        doc_part_identifier(&snapshot, &TableRef::root().child(too_long.as_str())),
        COUNTER_DOC_PART_1
    );
}

#[test]
fn test_long_doc_part_counter_collision() {
    let mut snapshot = database_snapshot();
    let coll = snapshot.collection_by_name("database", "collecti").unwrap().handle();
    snapshot.add_doc_part(coll, TableRef::root(), COUNTER_DOC_PART_1).unwrap();

    let too_long = longs("long", 24);
    assert_eq!(
        doc_part_identifier(&snapshot, &TableRef::root().child(too_long.as_str())),
        COUNTER_DOC_PART_2
    );
}

#[test]
fn test_fields() {
    let (snapshot, part) = doc_part_snapshot();
    let doc_part = snapshot.doc_part(part);
    let factory = factory();
    assert_eq!(factory.field_identifier(doc_part, "", FieldType::String).unwrap(), "_s");
    assert_eq!(
        factory.field_identifier(doc_part, "unallowed_column", FieldType::String).unwrap(),
        "_unallowed_column_s"
    );
    assert_eq!(factory.field_identifier(doc_part, "field", FieldType::String).unwrap(), "field_s");
}

#[test]
fn test_long_fields() {
    let (snapshot, part) = doc_part_snapshot();
    let doc_part = snapshot.doc_part(part);
    let factory = factory();

    let fits = longs("field_", 24);
    assert_eq!(
        factory.field_identifier(doc_part, &fits, FieldType::String).unwrap(),
        format!("{}_s", fits)
    );

    let too_long = longs("field____long", 24);
    assert_eq!(
        factory.field_identifier(doc_part, &too_long, FieldType::String).unwrap(),
        COUNTER_FIELD_1
    );
}

#[test]
fn test_long_field_counter_collision() {
    let (mut snapshot, part) = doc_part_snapshot();
    snapshot
        .add_field(part, "field_collider", FieldType::String, COUNTER_FIELD_1)
        .unwrap();
    let too_long = longs("field____long", 24);
    assert_eq!(
        factory()
            .field_identifier(snapshot.doc_part(part), &too_long, FieldType::String)
            .unwrap(),
        COUNTER_FIELD_2
    );
}

#[test]
fn test_index_shares_table_namespace() {
    let mut snapshot = database_snapshot();
    let coll = snapshot.collection_by_name("database", "collecti").unwrap().handle();
    snapshot
        .add_doc_part(coll, TableRef::root(), "collecti_name_s_a_idx")
        .unwrap();

    let database = snapshot.database_by_name("database").unwrap();
    let identifier = factory()
        .index_identifier(database, "collecti", [("name_s", true)])
        .unwrap();
    assert_eq!(identifier, "collecti_name_s_a_1_idx");
}

#[test]
fn test_exhausted_budget_names_last_collision() {
    let mut snapshot = MetaSnapshot::new();
    snapshot.add_database("first", "database").unwrap();
    snapshot.add_database("second", "database_1").unwrap();

    let factory = factory().with_budget(GenerationBudget::attempts(1));
    let err = factory.database_identifier(&snapshot, "database").unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, Error::GenerationExhausted(_)));
    assert!(message.contains("Last collided identifier: database_1"), "{}", message);
    assert!(message.contains("[database]"), "{}", message);
}

proptest! {
    #[test]
    fn prop_identifiers_fit_and_are_stable(name in "[A-Za-z0-9 _.-]{0,300}") {
        let snapshot = MetaSnapshot::new();
        let factory = factory();
        let first = factory.database_identifier(&snapshot, &name).unwrap();
        let second = factory.database_identifier(&snapshot, &name).unwrap();
        prop_assert!(first.chars().count() <= 128);
        prop_assert_eq!(&first, &second);
        prop_assert!(first
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$'));
    }

    #[test]
    fn prop_counter_avoids_every_taken_identifier(taken in 0usize..8) {
        let mut snapshot = MetaSnapshot::new();
        snapshot.add_database("db0", "orders").unwrap();
        for n in 1..=taken {
            snapshot.add_database(&format!("db{}", n), &format!("orders_{}", n)).unwrap();
        }
        let identifier = factory().database_identifier(&snapshot, "orders").unwrap();
        prop_assert_eq!(identifier, format!("orders_{}", taken + 1));
    }
}
