//! Per-thread busy leases.
//!
//! A thread may have at most one unfinished top-level run. Starting a run
//! acquires the thread's lease atomically; dropping the lease frees the
//! thread, so every exit path of the run task (including a panic) releases
//! it.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use uuid::Uuid;

/// Thread id -> id of the run holding the thread. Cloning shares the map.
#[derive(Debug, Clone, Default)]
pub struct ThreadLeases {
    held: Arc<DashMap<Uuid, Uuid>>,
}

impl ThreadLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the thread for `run_id`, or return the id of the run holding it.
    pub fn acquire(&self, thread_id: Uuid, run_id: Uuid) -> Result<ThreadLease, Uuid> {
        match self.held.entry(thread_id) {
            Entry::Occupied(entry) => Err(*entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(run_id);
                debug!(%thread_id, %run_id, "thread lease acquired");
                Ok(ThreadLease {
                    thread_id,
                    run_id,
                    held: Arc::clone(&self.held),
                })
            }
        }
    }

    /// The run currently holding the thread.
    pub fn holder(&self, thread_id: &Uuid) -> Option<Uuid> {
        self.held.get(thread_id).map(|r| *r)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// Ownership of a thread's busy state. Released on drop.
#[derive(Debug)]
pub struct ThreadLease {
    thread_id: Uuid,
    run_id: Uuid,
    held: Arc<DashMap<Uuid, Uuid>>,
}

impl ThreadLease {
    pub fn thread_id(&self) -> Uuid {
        self.thread_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Drop for ThreadLease {
    fn drop(&mut self) {
        let run_id = self.run_id;
        if self
            .held
            .remove_if(&self.thread_id, |_, holder| *holder == run_id)
            .is_some()
        {
            debug!(thread_id = %self.thread_id, %run_id, "thread lease released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_reports_holder() {
        let leases = ThreadLeases::new();
        let thread_id = Uuid::now_v7();
        let first = Uuid::now_v7();
        let _lease = leases.acquire(thread_id, first).unwrap();
        assert_eq!(leases.acquire(thread_id, Uuid::now_v7()).unwrap_err(), first);
        assert_eq!(leases.holder(&thread_id), Some(first));
    }

    #[test]
    fn test_drop_releases() {
        let leases = ThreadLeases::new();
        let thread_id = Uuid::now_v7();
        let lease = leases.acquire(thread_id, Uuid::now_v7()).unwrap();
        drop(lease);
        assert!(leases.is_empty());
        assert!(leases.acquire(thread_id, Uuid::now_v7()).is_ok());
    }

    #[test]
    fn test_stale_lease_drop_keeps_new_holder() {
        let leases = ThreadLeases::new();
        let thread_id = Uuid::now_v7();
        let stale = leases.acquire(thread_id, Uuid::now_v7()).unwrap();
        leases.held.remove(&thread_id);
        let current = Uuid::now_v7();
        let _lease = leases.acquire(thread_id, current).unwrap();

        drop(stale);
        assert_eq!(leases.holder(&thread_id), Some(current));
    }

    #[test]
    fn test_released_on_panic() {
        let leases = ThreadLeases::new();
        let thread_id = Uuid::now_v7();
        let cloned = leases.clone();
        let result = std::thread::spawn(move || {
            let _lease = cloned.acquire(thread_id, Uuid::now_v7()).unwrap();
            panic!("run task panicked");
        })
        .join();
        assert!(result.is_err());
        assert!(leases.holder(&thread_id).is_none());
    }

    #[test]
    fn test_concurrent_acquire_single_winner() {
        let leases = ThreadLeases::new();
        let thread_id = Uuid::now_v7();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let leases = leases.clone();
                std::thread::spawn(move || {
                    leases
                        .acquire(thread_id, Uuid::now_v7())
                        .map(std::mem::forget)
                        .is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
