//! Pending email approvals: one per thread, durable with in-memory fallback.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::pipeline::types::{EmailDraft, ThreadType};
use crate::store::durable::DurableHandle;
use crate::store::memory::FallbackStore;

/// A drafted email waiting for the user's go-ahead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub thread_id: String,
    pub thread_type: ThreadType,
    /// Who asked for the email; individual-thread replies go back to them.
    pub sender_number: String,
    pub draft: EmailDraft,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingApproval {
    pub fn new(
        thread_id: impl Into<String>,
        thread_type: ThreadType,
        sender_number: impl Into<String>,
        draft: EmailDraft,
        ttl_minutes: u32,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            thread_id: thread_id.into(),
            thread_type,
            sender_number: sender_number.into(),
            draft,
            created_at,
            expires_at: created_at + Duration::minutes(i64::from(ttl_minutes)),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Reads and writes pending approvals, preferring the durable store.
pub struct ApprovalStore {
    durable: Arc<DurableHandle>,
    fallback: Arc<FallbackStore>,
}

impl ApprovalStore {
    pub fn new(durable: Arc<DurableHandle>, fallback: Arc<FallbackStore>) -> Self {
        Self { durable, fallback }
    }

    /// Store an approval, replacing any older one for the same thread.
    pub async fn save(&self, approval: PendingApproval) {
        if let Ok(Some(store)) = self.durable.get().await {
            match store.save_pending_approval(&approval).await {
                Ok(()) => {
                    debug!(thread_id = %approval.thread_id, "Pending approval stored");
                    return;
                }
                Err(e) => {
                    warn!(thread_id = %approval.thread_id, error = %e, "Approval write failed, keeping it in memory");
                }
            }
        }
        self.fallback.save_approval(approval).await;
    }

    /// The unexpired approval for a thread, if any.
    pub async fn active(&self, thread_id: &str) -> Option<PendingApproval> {
        let now = Utc::now();
        let from_durable = match self.durable.get().await {
            Ok(Some(store)) => match store.get_pending_approval(thread_id).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(thread_id = %thread_id, error = %e, "Approval read failed");
                    None
                }
            },
            _ => None,
        };
        let approval = match from_durable {
            Some(approval) => Some(approval),
            None => self.fallback.get_approval(thread_id).await,
        };
        approval.filter(|a| !a.is_expired(now))
    }

    /// Forget the approval for a thread in both backends.
    pub async fn clear(&self, thread_id: &str) {
        if let Ok(Some(store)) = self.durable.get().await
            && let Err(e) = store.delete_pending_approval(thread_id).await
        {
            warn!(thread_id = %thread_id, error = %e, "Approval delete failed");
        }
        self.fallback.remove_approval(thread_id).await;
    }

    /// Sweep expired approvals. Returns how many were removed.
    pub async fn expire(&self, now: DateTime<Utc>) -> u64 {
        let mut removed = self.fallback.expire_approvals(now).await as u64;
        if let Ok(Some(store)) = self.durable.get().await {
            match store.delete_expired_approvals(now).await {
                Ok(n) => removed += n,
                Err(e) => warn!(error = %e, "Expiring durable approvals failed"),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::libsql_backend::LibSqlBackend;

    fn draft() -> EmailDraft {
        EmailDraft {
            recipient: Some("bob@example.com".into()),
            subject: "Hi".into(),
            body: "Body".into(),
        }
    }

    fn memory_only() -> ApprovalStore {
        ApprovalStore::new(
            Arc::new(DurableHandle::disabled()),
            Arc::new(FallbackStore::new(None)),
        )
    }

    #[tokio::test]
    async fn save_and_clear_in_memory() {
        let store = memory_only();
        store
            .save(PendingApproval::new("t1", ThreadType::Individual, "+1", draft(), 30))
            .await;
        assert!(store.active("t1").await.is_some());
        store.clear("t1").await;
        assert!(store.active("t1").await.is_none());
    }

    #[tokio::test]
    async fn expired_approvals_are_ignored_and_swept() {
        let store = memory_only();
        store
            .save(PendingApproval::new("t1", ThreadType::Individual, "+1", draft(), 0))
            .await;
        assert!(store.active("t1").await.is_none());
        assert_eq!(store.expire(Utc::now()).await, 1);
    }

    #[tokio::test]
    async fn durable_store_is_preferred() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let fallback = Arc::new(FallbackStore::new(None));
        let store = ApprovalStore::new(
            Arc::new(DurableHandle::with_store(backend.clone())),
            fallback.clone(),
        );
        store
            .save(PendingApproval::new("t1", ThreadType::Group, "+1", draft(), 30))
            .await;
        assert!(fallback.get_approval("t1").await.is_none());
        assert_eq!(store.active("t1").await.unwrap().thread_type, ThreadType::Group);
    }
}
