//! Identifier generation
//!
//! Derives schema, table, column and index identifiers from the free-text
//! names of databases, collections, document paths and fields.
//!
//! Every operation builds a [`NameChain`] of normalized segments and runs the
//! same search:
//!
//! 1. The straight attempt joins the segments verbatim. If it fits the
//!    backend's maximum size and nothing in the namespace uses it, it wins.
//! 2. Otherwise the counter strategy joins the chain, appends `_<n>` and cuts
//!    the middle of the name so the result fits. `n` starts at 1 and grows on
//!    every collision until the [`GenerationBudget`] runs out.
//!
//! Identifiers the backend does not allow (reserved names) are prefixed with
//! the separator once.
//!
//! ```rust
//! use photondb_d2r::backend::constraints::DefaultIdentifierConstraints;
//! use photondb_d2r::identifier::IdentifierFactory;
//! use photondb_d2r::meta::MetaSnapshot;
//! use std::sync::Arc;
//!
//! # fn example() -> photondb_d2r::error::Result<()> {
//! let factory = IdentifierFactory::new(Arc::new(DefaultIdentifierConstraints::postgresql()?));
//! let snapshot = MetaSnapshot::new();
//! assert_eq!(factory.database_identifier(&snapshot, "My Shop")?, "my_shop");
//! assert_eq!(factory.database_identifier(&snapshot, "torodb")?, "_torodb");
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod checker;
pub mod converter;
pub mod name_chain;

pub use budget::GenerationBudget;
pub use checker::{
    CollectionIdentifierChecker, DatabaseIdentifierChecker, FieldIdentifierChecker,
    IdentifierChecker, IndexIdentifierChecker, TableIdentifierChecker,
};
pub use converter::{ChainConverters, NameConverter};
pub use name_chain::{normalize, NameChain};

use crate::backend::constraints::IdentifierConstraints;
use crate::document::FieldType;
use crate::error::{Error, GenerationExhausted, Result};
use crate::meta::{MetaDatabase, MetaDocPart, MetaSnapshot};
use crate::table_ref::TableRef;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Immutable suffix of index identifiers.
pub const INDEX_SUFFIX: &str = "idx";

/// Mints identifiers that satisfy the backend constraints and do not collide
/// with anything in the given metadata.
///
/// The factory never modifies metadata. Callers that may race on the same
/// namespace must serialize "generate then register".
#[derive(Clone)]
pub struct IdentifierFactory {
    constraints: Arc<dyn IdentifierConstraints>,
    budget: GenerationBudget,
}

impl std::fmt::Debug for IdentifierFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierFactory")
            .field("identifier_max_size", &self.constraints.identifier_max_size())
            .field("budget", &self.budget)
            .finish()
    }
}

struct Candidate {
    identifier: String,
    allowed: bool,
}

impl IdentifierFactory {
    pub fn new(constraints: Arc<dyn IdentifierConstraints>) -> Self {
        Self {
            constraints,
            budget: GenerationBudget::default(),
        }
    }

    pub fn with_budget(mut self, budget: GenerationBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn constraints(&self) -> &dyn IdentifierConstraints {
        self.constraints.as_ref()
    }

    pub fn budget(&self) -> GenerationBudget {
        self.budget
    }

    fn name_chain(&self) -> NameChain {
        NameChain::new(self.constraints.separator())
    }

    pub fn database_identifier(&self, snapshot: &MetaSnapshot, database: &str) -> Result<String> {
        let mut chain = self.name_chain();
        chain.push(database);
        self.generate(&chain, &DatabaseIdentifierChecker::new(snapshot), None)
    }

    pub fn collection_identifier(
        &self,
        snapshot: &MetaSnapshot,
        database: &str,
        collection: &str,
    ) -> Result<String> {
        let mut chain = self.name_chain();
        chain.push(database);
        chain.push(collection);
        self.generate(&chain, &CollectionIdentifierChecker::new(snapshot), None)
    }

    pub fn doc_part_identifier(
        &self,
        database: &MetaDatabase,
        collection: &str,
        table_ref: &TableRef,
    ) -> Result<String> {
        let mut chain = self.name_chain();
        chain.push(collection);
        chain.push_table_ref(table_ref, self.constraints.array_dimension_separator());
        self.generate(&chain, &TableIdentifierChecker::new(database), None)
    }

    /// Column identifier of field `field` stored as `field_type`; the type
    /// marker is always the last segment.
    pub fn field_identifier(
        &self,
        doc_part: &MetaDocPart,
        field: &str,
        field_type: FieldType,
    ) -> Result<String> {
        let mut chain = self.name_chain();
        chain.push(field);
        let marker = self.constraints.field_type_identifier(field_type).to_string();
        self.generate(&chain, &FieldIdentifierChecker::new(doc_part), Some(&marker))
    }

    pub fn scalar_field_identifier(&self, field_type: FieldType) -> String {
        self.constraints.scalar_identifier(field_type)
    }

    /// Identifier of an index over `columns` (column identifier, ascending)
    /// of table `table`.
    pub fn index_identifier<I, S>(&self, database: &MetaDatabase, table: &str, columns: I) -> Result<String>
    where
        I: IntoIterator<Item = (S, bool)>,
        S: AsRef<str>,
    {
        let mut chain = self.name_chain();
        chain.push(table);
        for (column, ascending) in columns {
            chain.push(column.as_ref());
            chain.push(if ascending { "a" } else { "d" });
        }
        self.generate(&chain, &IndexIdentifierChecker::new(database), Some(INDEX_SUFFIX))
    }

    fn generate(
        &self,
        chain: &NameChain,
        checker: &dyn IdentifierChecker,
        suffix: Option<&str>,
    ) -> Result<String> {
        let started = Instant::now();
        let max_size = self.constraints.identifier_max_size();
        let mut last_collision = None;

        let candidate = self.build(chain, ChainConverters::straight(), 1, checker, suffix);
        if candidate.allowed && fits(&candidate.identifier, max_size) {
            if checker.is_unique(&candidate.identifier) {
                return Ok(candidate.identifier);
            }
            last_collision = Some(candidate.identifier);
        }

        debug!(
            name_chain = %chain,
            collision = ?last_collision,
            "Straight identifier unusable, trying counter strategy"
        );

        let mut counter = 1u32;
        let mut attempts = 0u32;
        while self.budget.allows(started, attempts) {
            attempts += 1;
            let candidate = self.build(chain, ChainConverters::counter(), counter, checker, suffix);
            if !candidate.allowed || !fits(&candidate.identifier, max_size) {
                break;
            }
            if checker.is_unique(&candidate.identifier) {
                debug!(identifier = %candidate.identifier, counter, "Generated identifier");
                return Ok(candidate.identifier);
            }
            last_collision = Some(candidate.identifier);
            counter = counter.saturating_add(1);
        }

        warn!(
            name_chain = %chain,
            attempts,
            last_collision = ?last_collision,
            "Identifier generation exhausted"
        );
        Err(Error::GenerationExhausted(GenerationExhausted {
            last_collision,
            name_chain: chain.to_string(),
        }))
    }

    fn build(
        &self,
        chain: &NameChain,
        converters: ChainConverters,
        counter: u32,
        checker: &dyn IdentifierChecker,
        suffix: Option<&str>,
    ) -> Candidate {
        let separator = self.constraints.separator();
        let max_size = self.constraints.identifier_max_size();
        let name_max_size = match suffix {
            Some(suffix) => max_size.saturating_sub(suffix.chars().count() + 1),
            None => max_size,
        };

        let mut identifier = converters.assemble(chain.segments(), separator, name_max_size, counter);
        if let Some(suffix) = suffix {
            identifier.push(separator);
            identifier.push_str(suffix);
        }

        let constraints = self.constraints.as_ref();
        if checker.is_allowed(constraints, &identifier) {
            return Candidate {
                identifier,
                allowed: true,
            };
        }

        // Leave room for the prefix.
        let mut identifier =
            converters.assemble(chain.segments(), separator, name_max_size.saturating_sub(1), counter);
        if let Some(suffix) = suffix {
            identifier.push(separator);
            identifier.push_str(suffix);
        }
        identifier.insert(0, separator);
        let allowed = checker.is_allowed(constraints, &identifier);
        Candidate { identifier, allowed }
    }
}

fn fits(identifier: &str, max_size: usize) -> bool {
    identifier.chars().count() <= max_size
}
