//! Thread management service.
//!
//! Creates, lists, renames, archives, and soft-deletes conversation
//! threads. Writes go through the persistence gateway (with its retries);
//! reads go straight to the store.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use switchboard_types::error::ThreadError;
use switchboard_types::thread::{Thread, ThreadStatus};

use crate::persistence::{PersistenceGateway, WriteOp};
use crate::repository::RunStore;
use crate::runtime::AgentRegistry;

/// Longest accepted thread title, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Partial update of a thread (`PATCH`).
#[derive(Debug, Clone, Default)]
pub struct ThreadUpdate {
    pub title: Option<String>,
    pub status: Option<ThreadStatus>,
}

pub struct ThreadService<S: RunStore> {
    gateway: PersistenceGateway<S>,
    agents: Arc<AgentRegistry>,
}

impl<S: RunStore> ThreadService<S> {
    pub fn new(gateway: PersistenceGateway<S>, agents: Arc<AgentRegistry>) -> Self {
        Self { gateway, agents }
    }

    /// Create an active thread for a registered agent.
    pub async fn create_thread(
        &self,
        agent_id: &str,
        title: Option<String>,
    ) -> Result<Thread, ThreadError> {
        let agent_id = agent_id.trim();
        if agent_id.is_empty() {
            return Err(ThreadError::Invalid("agent_id cannot be empty".to_string()));
        }
        if !self.agents.contains(agent_id) {
            return Err(ThreadError::Invalid(format!(
                "agent '{agent_id}' is not registered"
            )));
        }
        let title = title.map(|t| validate_title(&t)).transpose()?;

        let thread = Thread::new(agent_id, title);
        self.gateway
            .write_now(WriteOp::CreateThread(thread.clone()))
            .await?;
        info!(thread_id = %thread.id, %agent_id, "thread created");
        Ok(thread)
    }

    /// Get a thread. Deleted threads are reported as not found.
    pub async fn get_thread(&self, thread_id: Uuid) -> Result<Thread, ThreadError> {
        match self.gateway.get_thread(&thread_id).await? {
            Some(thread) if thread.status != ThreadStatus::Deleted => Ok(thread),
            _ => Err(ThreadError::NotFound(thread_id)),
        }
    }

    /// Non-deleted threads, most recently active first.
    pub async fn list_threads(&self, agent_id: Option<&str>) -> Result<Vec<Thread>, ThreadError> {
        Ok(self.gateway.list_threads(agent_id, false).await?)
    }

    pub async fn rename(&self, thread_id: Uuid, title: &str) -> Result<Thread, ThreadError> {
        self.update(
            thread_id,
            ThreadUpdate {
                title: Some(title.to_string()),
                status: None,
            },
        )
        .await
    }

    pub async fn archive(&self, thread_id: Uuid) -> Result<Thread, ThreadError> {
        self.set_status(thread_id, ThreadStatus::Archived).await
    }

    pub async fn unarchive(&self, thread_id: Uuid) -> Result<Thread, ThreadError> {
        self.set_status(thread_id, ThreadStatus::Active).await
    }

    /// Soft delete: the record is kept with status `deleted`.
    pub async fn delete(&self, thread_id: Uuid) -> Result<Thread, ThreadError> {
        self.set_status(thread_id, ThreadStatus::Deleted).await
    }

    pub async fn set_status(
        &self,
        thread_id: Uuid,
        status: ThreadStatus,
    ) -> Result<Thread, ThreadError> {
        self.update(
            thread_id,
            ThreadUpdate {
                title: None,
                status: Some(status),
            },
        )
        .await
    }

    /// Apply a partial update.
    pub async fn update(
        &self,
        thread_id: Uuid,
        update: ThreadUpdate,
    ) -> Result<Thread, ThreadError> {
        let mut thread = self.get_thread(thread_id).await?;
        if let Some(title) = update.title {
            thread.title = Some(validate_title(&title)?);
        }
        if let Some(status) = update.status {
            thread.status = status;
        }
        thread.updated_at = Utc::now();

        self.gateway
            .write_now(WriteOp::UpdateThread(thread.clone()))
            .await?;
        info!(thread_id = %thread.id, status = %thread.status, "thread updated");
        Ok(thread)
    }
}

fn validate_title(title: &str) -> Result<String, ThreadError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ThreadError::Invalid("title cannot be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ThreadError::Invalid(format!(
            "title is longer than {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRunStore;
    use crate::runtime::{BoxAgentRuntime, ScriptedRuntime};
    use switchboard_types::config::PersistenceConfig;

    fn service() -> ThreadService<InMemoryRunStore> {
        let gateway = PersistenceGateway::new(
            Arc::new(InMemoryRunStore::new()),
            &PersistenceConfig::default(),
        );
        let agents = AgentRegistry::new().with(
            "it-support",
            "helpdesk",
            BoxAgentRuntime::new(ScriptedRuntime::new("it-support", vec![])),
        );
        ThreadService::new(gateway, Arc::new(agents))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let svc = service();
        let thread = svc.create_thread("it-support", None).await.unwrap();
        assert_eq!(thread.status, ThreadStatus::Active);
        assert!(thread.title.is_none());
        let fetched = svc.get_thread(thread.id).await.unwrap();
        assert_eq!(fetched.id, thread.id);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_agent() {
        let svc = service();
        let err = svc.create_thread("nobody", None).await.unwrap_err();
        assert!(matches!(err, ThreadError::Invalid(_)));
        let err = svc.create_thread("  ", None).await.unwrap_err();
        assert!(matches!(err, ThreadError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_rename_trims_and_validates() {
        let svc = service();
        let thread = svc.create_thread("it-support", None).await.unwrap();
        let renamed = svc.rename(thread.id, "  VPN trouble  ").await.unwrap();
        assert_eq!(renamed.title.as_deref(), Some("VPN trouble"));
        assert!(svc.rename(thread.id, "   ").await.is_err());
        assert!(svc.rename(thread.id, &"x".repeat(MAX_TITLE_CHARS + 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_archive_and_unarchive() {
        let svc = service();
        let thread = svc.create_thread("it-support", None).await.unwrap();
        assert_eq!(svc.archive(thread.id).await.unwrap().status, ThreadStatus::Archived);
        assert_eq!(svc.unarchive(thread.id).await.unwrap().status, ThreadStatus::Active);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_thread() {
        let svc = service();
        let keep = svc.create_thread("it-support", Some("keep".into())).await.unwrap();
        let gone = svc.create_thread("it-support", Some("gone".into())).await.unwrap();
        svc.delete(gone.id).await.unwrap();

        assert!(matches!(svc.get_thread(gone.id).await, Err(ThreadError::NotFound(_))));
        let listed: Vec<Uuid> = svc.list_threads(None).await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(listed, vec![keep.id]);

        let record = svc.gateway.get_thread(&gone.id).await.unwrap().unwrap();
        assert_eq!(record.status, ThreadStatus::Deleted);
        assert!(svc.unarchive(gone.id).await.is_err());
    }
}
