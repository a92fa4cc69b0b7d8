//! Live fan-out of trace notices to stream subscribers.
//!
//! One hub exists per top-level run; handoff sub-runs publish into their
//! root's hub so a single client stream sees the whole delegation tree.
//!
//! Every subscriber owns a bounded `mpsc` queue and publishing uses
//! `try_send`, so a publisher never waits on a client. A subscriber whose
//! queue is full or whose receiver is gone is detached: its sender is
//! dropped and the receiver ends after the buffered notices. Unlike a
//! `broadcast` channel this never skips notices for a subscriber that is
//! still attached.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use switchboard_types::run::RunStatus;
use switchboard_types::step::Step;

/// What the ledger tells live subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceNotice {
    /// A step was appended to some run in the tree.
    Appended(Step),
    /// A run in the tree reached its terminal status.
    Finished { run_id: Uuid, status: RunStatus },
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<TraceNotice>,
}

pub struct TraceHub {
    root_run_id: Uuid,
    buffer: usize,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl TraceHub {
    /// Create a hub for the tree rooted at `root_run_id`. Each subscriber
    /// may fall `buffer` notices behind before it is detached.
    pub fn new(root_run_id: Uuid, buffer: usize) -> Self {
        Self {
            root_run_id,
            buffer: buffer.max(1),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Attach a subscriber that receives every notice published from now on.
    pub fn subscribe(&self) -> mpsc::Receiver<TraceNotice> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Subscriber { id, tx });
        debug!(root_run_id = %self.root_run_id, subscriber = id, "stream subscriber attached");
        rx
    }

    /// Deliver a notice to every attached subscriber without waiting.
    pub fn publish(&self, notice: &TraceNotice) {
        let root_run_id = self.root_run_id;
        self.lock().retain(|sub| match sub.tx.try_send(notice.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%root_run_id, subscriber = sub.id, "stream subscriber fell behind, detaching");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%root_run_id, subscriber = sub.id, "stream subscriber gone, detaching");
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Detach every subscriber.
    pub fn close(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for TraceHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceHub")
            .field("root_run_id", &self.root_run_id)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
