//! `DurableStore` trait: the operations the pipeline needs from persistent storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::pipeline::types::{Thread, ThreadMessage, User};
use crate::store::approvals::PendingApproval;

/// Backend-agnostic persistence for threads, users and pending approvals.
#[async_trait]
pub trait DurableStore: Send + Sync {
    // ── Threads ─────────────────────────────────────────────────────

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>, DatabaseError>;

    /// Insert a new thread row. Returns its id.
    async fn create_thread(&self, thread: &Thread) -> Result<String, DatabaseError>;

    /// Replace the stored message window.
    async fn update_thread_messages(
        &self,
        thread_id: &str,
        messages: &[ThreadMessage],
    ) -> Result<(), DatabaseError>;

    /// Replace the stored participant list.
    async fn update_thread_participants(
        &self,
        thread_id: &str,
        participants: &[String],
    ) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user_by_phone(&self, phone_number: i64) -> Result<Option<User>, DatabaseError>;

    async fn create_user(&self, name: &str, phone_number: i64) -> Result<User, DatabaseError>;

    async fn update_user_name(&self, phone_number: i64, name: &str) -> Result<(), DatabaseError>;

    // ── Pending approvals ───────────────────────────────────────────

    /// Insert or replace the approval for its thread.
    async fn save_pending_approval(&self, approval: &PendingApproval)
    -> Result<(), DatabaseError>;

    async fn get_pending_approval(
        &self,
        thread_id: &str,
    ) -> Result<Option<PendingApproval>, DatabaseError>;

    async fn delete_pending_approval(&self, thread_id: &str) -> Result<(), DatabaseError>;

    /// Delete approvals whose `expires_at` is at or before `now`. Returns the count removed.
    async fn delete_expired_approvals(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError>;
}
