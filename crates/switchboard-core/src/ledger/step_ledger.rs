//! StepLedger: the per-run, append-only sequence of steps.
//!
//! `append` is the single writer for a run's trace. Under the ledger's
//! async mutex it assigns the next sequence number, notifies the live hub,
//! and queues the write on the run's persistence lane. Holding the mutex
//! across the queueing keeps storage writes in sequence order.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::trace;
use uuid::Uuid;

use switchboard_types::error::PersistenceError;
use switchboard_types::run::RunStatus;
use switchboard_types::step::{Step, StepPayload};

use super::hub::{TraceHub, TraceNotice};
use crate::persistence::{PersistenceGateway, WriteOp};
use crate::repository::RunStore;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The run already ended; no further steps are accepted.
    #[error("ledger for run {0} is sealed")]
    Sealed(Uuid),

    /// The step was assigned and delivered live, but could not be queued
    /// for storage.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Default)]
struct LedgerState {
    next_sequence: u64,
    steps: Vec<Step>,
    sealed: bool,
}

pub struct StepLedger<S: RunStore> {
    run_id: Uuid,
    hub: Arc<TraceHub>,
    gateway: PersistenceGateway<S>,
    state: Mutex<LedgerState>,
}

impl<S: RunStore> StepLedger<S> {
    pub fn new(run_id: Uuid, hub: Arc<TraceHub>, gateway: PersistenceGateway<S>) -> Self {
        Self {
            run_id,
            hub,
            gateway,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append a step and return its sequence number.
    ///
    /// An `error` payload seals the ledger.
    pub async fn append(&self, payload: StepPayload) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().await;
        if state.sealed {
            return Err(LedgerError::Sealed(self.run_id));
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        let step = Step::new(self.run_id, sequence, payload);
        if step.payload.is_terminal() {
            state.sealed = true;
        }
        state.steps.push(step.clone());
        trace!(run_id = %self.run_id, sequence, kind = %step.kind(), "step appended");

        self.hub.publish(&TraceNotice::Appended(step.clone()));
        self.gateway
            .submit(self.run_id, WriteOp::InsertStep(step))
            .await?;
        Ok(sequence)
    }

    /// Steps with `sequence > since` (all steps when `since` is `None`).
    pub async fn steps_since(&self, since: Option<u64>) -> Vec<Step> {
        let state = self.state.lock().await;
        let start = match since {
            Some(n) => usize::try_from(n.saturating_add(1)).unwrap_or(usize::MAX),
            None => 0,
        };
        state.steps.get(start..).map(<[Step]>::to_vec).unwrap_or_default()
    }

    /// Seal the ledger and publish the run's terminal notice.
    pub async fn finish(&self, status: RunStatus) {
        let mut state = self.state.lock().await;
        state.sealed = true;
        self.hub.publish(&TraceNotice::Finished {
            run_id: self.run_id,
            status,
        });
    }
}
