use super::MetaSnapshot;
use crate::error::Result;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info};

/// Holder of the current metadata snapshot.
///
/// Readers take a cheap `Arc` of the current snapshot and keep a consistent
/// view for as long as they hold it. Writers are serialized: [`modify`]
/// works on a private copy and publishes it with the next version only when
/// the closure succeeds.
///
/// [`modify`]: MetainfoRepository::modify
#[derive(Debug, Default)]
pub struct MetainfoRepository {
    current: RwLock<Arc<MetaSnapshot>>,
    writer: Mutex<()>,
}

impl MetainfoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: MetaSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<MetaSnapshot> {
        self.current.read().clone()
    }

    /// Apply `f` to a copy of the current snapshot and commit it.
    ///
    /// Concurrent calls run one at a time. If `f` fails nothing is published.
    pub fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut MetaSnapshot) -> Result<T>,
    {
        let _guard = self.writer.lock();
        let mut staged = MetaSnapshot::clone(&self.current.read());

        match f(&mut staged) {
            Ok(value) => {
                staged.bump_version();
                let version = staged.version();
                *self.current.write() = Arc::new(staged);
                info!(version, "Committed metadata snapshot");
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, "Discarded metadata modification");
                Err(e)
            }
        }
    }
}
