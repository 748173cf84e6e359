// PhotonDB D2R - Document/Relational Mapping Engine
// Schemaless documents stored in relational tables

#![warn(rust_2018_idioms)]

pub mod backend;
pub mod config;
pub mod d2r;
pub mod document;
pub mod identifier;
pub mod meta;
pub mod r2d;
pub mod rid;
pub mod table_ref;

// Re-exports for convenience
pub use backend::constraints::{DefaultIdentifierConstraints, IdentifierConstraints};
pub use backend::memory::MemoryBackend;
pub use backend::StorageBackend;
pub use d2r::{CollectionDataAccumulator, D2RTranslator, InternalFields};
pub use document::{FieldType, KvDocument, KvValue, ToroDocument};
pub use identifier::{GenerationBudget, IdentifierFactory};
pub use meta::{MetaSnapshot, MetainfoRepository};
pub use r2d::{R2DBackendTranslator, R2DTranslator};
pub use rid::ReservedIdGenerator;
pub use table_ref::TableRef;

/// D2R error types
pub mod error {
    use crate::document::FieldType;
    use std::fmt;
    use thiserror::Error;

    /// No unique identifier could be generated within the budget.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct GenerationExhausted {
        /// Last candidate that fitted but was already taken.
        pub last_collision: Option<String>,
        pub name_chain: String,
    }

    impl fmt::Display for GenerationExhausted {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match &self.last_collision {
                Some(collision) => write!(
                    f,
                    "Identifier collision(s) does not allow to generate a valid identifier. \
                     Last collided identifier: {}. Name chain: {}",
                    collision, self.name_chain
                ),
                None => write!(
                    f,
                    "Can not generate a valid identifier. Name chain: {}",
                    self.name_chain
                ),
            }
        }
    }

    /// Failure decoding one stored column value.
    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum DecodeError {
        /// The backend could not deliver the value; retrying may succeed.
        #[error("Backend fault: {0}")]
        Backend(String),

        #[error("Malformed {field_type} value: {reason}")]
        Malformed { field_type: FieldType, reason: String },
    }

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("{0}")]
        GenerationExhausted(GenerationExhausted),

        #[error("Data integrity fault: {0}")]
        DataIntegrity(String),

        #[error("Decode error: {0}")]
        Decode(#[from] DecodeError),

        #[error("Transaction rolled back: {0}")]
        Rollback(String),

        #[error("Not found: {0}")]
        NotFound(String),

        #[error("Already exists: {0}")]
        AlreadyExists(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Configuration error: {0}")]
        Config(#[from] ::config::ConfigError),

        #[error("Storage error: {0}")]
        Storage(String),

        #[error("Serialization error: {0}")]
        Serialization(#[from] serde_json::Error),
    }

    impl Error {
        /// Whether the failed operation may succeed when retried in a new
        /// transaction.
        pub fn is_retryable(&self) -> bool {
            matches!(
                self,
                Error::Rollback(_) | Error::Decode(DecodeError::Backend(_))
            )
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;

}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
