//! Arena of live run links.
//!
//! Maps each executing run to its agent and parent so ancestor chains can
//! be walked without loading runs from storage. Entries are removed when a
//! run finishes; walks fall back to the store for runs no longer here.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use switchboard_types::run::Run;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLink {
    pub agent_id: String,
    pub parent_run_id: Option<Uuid>,
    pub depth: u8,
}

impl From<&Run> for RunLink {
    fn from(run: &Run) -> Self {
        Self {
            agent_id: run.agent_id.clone(),
            parent_run_id: run.parent_run_id,
            depth: run.depth,
        }
    }
}

/// Cloning produces a shared view.
#[derive(Debug, Clone, Default)]
pub struct RunArena {
    links: Arc<DashMap<Uuid, RunLink>>,
}

impl RunArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run: &Run) {
        self.links.insert(run.id, RunLink::from(run));
    }

    pub fn remove(&self, run_id: &Uuid) {
        self.links.remove(run_id);
    }

    pub fn get(&self, run_id: &Uuid) -> Option<RunLink> {
        self.links.get(run_id).map(|l| l.clone())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
