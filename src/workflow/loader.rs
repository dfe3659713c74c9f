//! Loading roster and attendance snapshots.
//!
//! Both collections are fetched together and either both land or neither
//! does. Each load takes a sequence ticket so that an older load finishing
//! late cannot overwrite the result of a newer one.

use crate::models::{AttendanceFilter, AttendanceRecord, Student};
use crate::store::{RecordStore, StoreResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// A roster and record set loaded together.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub students: Vec<Student>,
    pub records: Vec<AttendanceRecord>,
    complete: bool,
}

impl Snapshot {
    pub fn new(students: Vec<Student>, records: Vec<AttendanceRecord>) -> Self {
        Self {
            students,
            records,
            complete: true,
        }
    }

    /// Whether this snapshot came from a successful load. Only complete
    /// snapshots should be aggregated.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Result of a load that did not fail.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Loaded(Snapshot),
    /// A newer load started while this one was in flight; its data was dropped.
    Stale,
}

/// Loads snapshots from a record store and keeps the latest one.
pub struct SnapshotLoader {
    store: Arc<dyn RecordStore>,
    generation: AtomicU64,
    current: Mutex<Snapshot>,
}

impl SnapshotLoader {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            generation: AtomicU64::new(0),
            current: Mutex::new(Snapshot::default()),
        }
    }

    /// The most recently accepted snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch the roster and the filtered record set in parallel.
    ///
    /// On failure the held snapshot is reset to empty, unless a newer load
    /// has already taken over.
    pub async fn load(&self, filter: &AttendanceFilter) -> StoreResult<LoadOutcome> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Load #{} started with {:?}", ticket, filter);

        let result = tokio::try_join!(
            self.store.list_students(),
            self.store.list_attendance(filter)
        );

        let mut current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let is_latest = self.generation.load(Ordering::SeqCst) == ticket;

        match result {
            Ok((students, records)) if is_latest => {
                info!(
                    "Loaded {} students and {} attendance records",
                    students.len(),
                    records.len()
                );
                *current = Snapshot::new(students, records);
                Ok(LoadOutcome::Loaded(current.clone()))
            }
            Ok(_) => {
                debug!("Load #{} superseded, discarding its result", ticket);
                Ok(LoadOutcome::Stale)
            }
            Err(e) => {
                if is_latest {
                    warn!("Load failed, clearing roster and records: {}", e);
                    *current = Snapshot::default();
                } else {
                    debug!("Superseded load #{} failed: {}", ticket, e);
                }
                Err(e)
            }
        }
    }
}
