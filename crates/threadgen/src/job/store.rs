//! In-memory job store, the single source of truth for status and result
//! lookups.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::job::record::{JobId, JobRecord};

/// Concurrent map from job id to job record.
///
/// Contention is one writer (the executor owning a job) against many
/// readers (status/result queries), so a single `RwLock<HashMap>` is
/// enough. Mutations go through [`JobStore::update`], which applies the
/// mutator under the write lock, so readers never observe a torn record.
///
/// Records are never deleted here; retention is the embedder's policy.
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a freshly created record and returns its id.
    pub fn create(&self, record: JobRecord) -> JobId {
        let id = record.id.clone();
        let mut jobs = match self.jobs.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        jobs.insert(id.clone(), record);
        id
    }

    /// Returns a clone of the record, or `None` for unknown ids.
    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        let jobs = match self.jobs.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        jobs.get(id).cloned()
    }

    /// Applies `mutate` to the record under the write lock. Returns false
    /// if the id is unknown.
    ///
    /// The store serializes access; invariants like progress monotonicity
    /// are the caller's contract, enforced by [`JobRecord`] itself.
    pub fn update<F>(&self, id: &JobId, mutate: F) -> bool
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = match self.jobs.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        match jobs.get_mut(id) {
            Some(record) => {
                mutate(record);
                true
            }
            None => false,
        }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        match self.jobs.read() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::record::{JobKind, JobStatus, OwnerId};

    fn record(owner: &str) -> JobRecord {
        JobRecord::new(
            OwnerId::new(owner),
            JobKind::RawText {
                text: "text".to_string(),
            },
        )
    }

    #[test]
    fn test_create_then_get() {
        let store = JobStore::new();
        let id = store.create(record("alice"));

        let fetched = store.get(&id).unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[test]
    fn test_get_unknown_id() {
        let store = JobStore::new();
        assert!(store.get(&JobId::generate()).is_none());
    }

    #[test]
    fn test_update_applies_mutation() {
        let store = JobStore::new();
        let id = store.create(record("alice"));

        let updated = store.update(&id, |r| {
            r.mark_processing();
            r.advance_progress(50);
        });
        assert!(updated);

        let fetched = store.get(&id).unwrap();
        assert_eq!(fetched.status, JobStatus::Processing);
        assert_eq!(fetched.progress, 50);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let store = JobStore::new();
        assert!(!store.update(&JobId::generate(), |r| r.mark_processing()));
    }

    #[test]
    fn test_concurrent_readers_and_one_writer() {
        use std::sync::Arc;

        let store = Arc::new(JobStore::new());
        let id = store.create(record("alice"));

        let writer = {
            let store = Arc::clone(&store);
            let id = id.clone();
            std::thread::spawn(move || {
                for p in [10u8, 30, 50, 80, 100] {
                    store.update(&id, |r| {
                        r.mark_processing();
                        r.advance_progress(p);
                    });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    let mut last = 0u8;
                    for _ in 0..100 {
                        let record = store.get(&id).unwrap();
                        assert!(record.progress >= last, "progress went backwards");
                        last = record.progress;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
