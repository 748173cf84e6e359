//! Document model
//!
//! Schemaless documents as they enter the D2R translator and leave the R2D
//! translator.

pub mod field_type;
pub mod value;

pub use field_type::FieldType;
pub use value::{KvDocument, KvValue};

use serde_json::Value;

/// A reconstructed document together with the document id its rows share.
#[derive(Debug, Clone, PartialEq)]
pub struct ToroDocument {
    pub did: i32,
    pub root: KvDocument,
}

impl ToroDocument {
    pub fn new(did: i32, root: KvDocument) -> Self {
        Self { did, root }
    }

    pub fn to_json(&self) -> Value {
        Value::from(self.root.clone())
    }
}
