//! Reserved row ids
//!
//! Every row written to a doc-part table carries a `rid` drawn from a counter
//! owned by its (database, collection, table ref) triple. Counters live for the
//! whole process and must never hand out a value twice: a reused rid would
//! silently attach child rows to the wrong parent.

use crate::error::{Error, Result};
use crate::table_ref::TableRef;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const NOTHING_ISSUED: i64 = i64::MIN;

/// Counter of one doc part.
#[derive(Debug)]
struct RidCounter {
    next: AtomicI64,
    high_water: AtomicI64,
}

impl Default for RidCounter {
    fn default() -> Self {
        Self {
            next: AtomicI64::new(0),
            high_water: AtomicI64::new(NOTHING_ISSUED),
        }
    }
}

impl RidCounter {
    fn next(&self) -> Option<i32> {
        let issued = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next <= i64::from(i32::MAX)).then_some(next + 1)
            })
            .ok()?;
        self.high_water.fetch_max(issued, Ordering::AcqRel);
        i32::try_from(issued).ok()
    }

    fn set_next(&self, value: i32) -> std::result::Result<(), i64> {
        let high_water = self.high_water.load(Ordering::Acquire);
        if high_water != NOTHING_ISSUED && i64::from(value) <= high_water {
            return Err(high_water);
        }
        self.next.store(i64::from(value), Ordering::Release);
        Ok(())
    }
}

/// Rid counters of every doc part of one collection.
#[derive(Debug, Default)]
pub struct DocPartRidGenerator {
    counters: DashMap<TableRef, Arc<RidCounter>>,
}

impl DocPartRidGenerator {
    fn counter(&self, table_ref: &TableRef) -> Arc<RidCounter> {
        if let Some(counter) = self.counters.get(table_ref) {
            return counter.clone();
        }
        self.counters.entry(table_ref.clone()).or_default().clone()
    }

    /// Reserve the next rid of `table_ref`.
    pub fn next_rid(&self, table_ref: &TableRef) -> Result<i32> {
        self.counter(table_ref).next().ok_or_else(|| {
            warn!(table_ref = %table_ref, "Rid counter overflow");
            Error::DataIntegrity(format!("rid counter of {} overflowed", table_ref))
        })
    }

    /// Make the next [`next_rid`](Self::next_rid) call return exactly `value`.
    ///
    /// Fails when `value` is not above every rid already issued.
    pub fn set_next_rid(&self, table_ref: &TableRef, value: i32) -> Result<()> {
        self.counter(table_ref).set_next(value).map_err(|high_water| {
            warn!(table_ref = %table_ref, value, high_water, "Rid counter regression refused");
            Error::DataIntegrity(format!(
                "next rid {} of {} would reuse issued rid {}",
                value, table_ref, high_water
            ))
        })?;
        debug!(table_ref = %table_ref, value, "Set next rid");
        Ok(())
    }
}

/// Last rid persisted for one doc part, as found during startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RidMark {
    pub database: String,
    pub collection: String,
    pub table_ref: TableRef,
    pub last_rid: i32,
}

/// Process-wide allocator of reserved row ids.
#[derive(Debug, Default)]
pub struct ReservedIdGenerator {
    collections: DashMap<(String, String), Arc<DocPartRidGenerator>>,
}

impl ReservedIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_doc_part_rid_generator(&self, database: &str, collection: &str) -> Arc<DocPartRidGenerator> {
        let key = (database.to_string(), collection.to_string());
        if let Some(generator) = self.collections.get(&key) {
            return generator.clone();
        }
        self.collections.entry(key).or_default().clone()
    }

    pub fn next_rid(&self, database: &str, collection: &str, table_ref: &TableRef) -> Result<i32> {
        self.get_doc_part_rid_generator(database, collection)
            .next_rid(table_ref)
    }

    pub fn set_next_rid(
        &self,
        database: &str,
        collection: &str,
        table_ref: &TableRef,
        value: i32,
    ) -> Result<()> {
        self.get_doc_part_rid_generator(database, collection)
            .set_next_rid(table_ref, value)
    }

    /// Resynchronize counters with the rids found in storage.
    ///
    /// Must run before any writer allocates rids.
    pub fn recover<I>(&self, marks: I) -> Result<()>
    where
        I: IntoIterator<Item = RidMark>,
    {
        let mut recovered = 0usize;
        for mark in marks {
            let next = mark.last_rid.checked_add(1).ok_or_else(|| {
                Error::DataIntegrity(format!(
                    "persisted rid {} of {} has no successor",
                    mark.last_rid, mark.table_ref
                ))
            })?;
            self.set_next_rid(&mark.database, &mark.collection, &mark.table_ref, next)?;
            recovered += 1;
        }
        info!(doc_parts = recovered, "Recovered rid counters");
        Ok(())
    }
}
