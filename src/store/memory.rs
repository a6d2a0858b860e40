//! In-process fallback store.
//!
//! Holds threads and pending approvals when the durable store is not
//! configured or a durable call failed. Owned by the composition root and
//! shared by reference; its contents die with the process.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::pipeline::normalize::same_number;
use crate::pipeline::types::{Thread, ThreadMessage};
use crate::store::approvals::PendingApproval;

pub struct FallbackStore {
    agent_number: Option<String>,
    threads: RwLock<HashMap<String, Thread>>,
    /// Threads written here while a durable store was expected.
    diverged: RwLock<HashSet<String>>,
    approvals: RwLock<HashMap<String, PendingApproval>>,
}

impl FallbackStore {
    /// `agent_number` is used to keep the agent's own messages out of cached windows.
    pub fn new(agent_number: Option<String>) -> Self {
        Self {
            agent_number,
            threads: RwLock::new(HashMap::new()),
            diverged: RwLock::new(HashSet::new()),
            approvals: RwLock::new(HashMap::new()),
        }
    }

    fn is_agent(&self, number: &str) -> bool {
        self.agent_number
            .as_deref()
            .is_some_and(|agent| same_number(agent, number))
    }

    fn strip_agent_messages(&self, thread: &mut Thread) {
        thread.messages.retain(|m| !self.is_agent(&m.sender_number));
    }

    // ── Threads ─────────────────────────────────────────────────────

    pub async fn get_thread(&self, thread_id: &str) -> Option<Thread> {
        self.threads.read().await.get(thread_id).cloned()
    }

    /// Insert or overwrite a whole thread.
    pub async fn put_thread(&self, mut thread: Thread) {
        self.strip_agent_messages(&mut thread);
        self.threads.write().await.insert(thread.id.clone(), thread);
    }

    /// Append to the cached window, creating the thread if needed.
    ///
    /// New threads start with the sender and the agent as participants.
    pub async fn append_message(&self, thread_id: &str, message: ThreadMessage, window: usize) {
        let mut threads = self.threads.write().await;
        let thread = threads.entry(thread_id.to_string()).or_insert_with(|| {
            let mut thread = Thread::new(thread_id);
            if let Some(agent) = &self.agent_number {
                thread.add_participant(agent);
            }
            thread
        });
        thread.normalize_participants();
        thread.add_participant(&message.sender_number);
        thread.append(message, window);
        self.strip_agent_messages(thread);
    }

    pub async fn upsert_participant(&self, thread_id: &str, number: &str) {
        let mut threads = self.threads.write().await;
        let thread = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Thread::new(thread_id));
        thread.normalize_participants();
        thread.add_participant(number);
    }

    pub async fn remove_thread(&self, thread_id: &str) -> Option<Thread> {
        self.diverged.write().await.remove(thread_id);
        self.threads.write().await.remove(thread_id)
    }

    // ── Divergence tracking ─────────────────────────────────────────

    pub async fn mark_diverged(&self, thread_id: &str) {
        self.diverged.write().await.insert(thread_id.to_string());
    }

    /// Thread ids written here while the durable store was failing, sorted.
    pub async fn diverged_threads(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.diverged.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }

    // ── Pending approvals ───────────────────────────────────────────

    pub async fn save_approval(&self, approval: PendingApproval) {
        self.approvals
            .write()
            .await
            .insert(approval.thread_id.clone(), approval);
    }

    pub async fn get_approval(&self, thread_id: &str) -> Option<PendingApproval> {
        self.approvals.read().await.get(thread_id).cloned()
    }

    pub async fn remove_approval(&self, thread_id: &str) -> Option<PendingApproval> {
        self.approvals.write().await.remove(thread_id)
    }

    /// Drop approvals that expired at or before `now`. Returns the count removed.
    pub async fn expire_approvals(&self, now: DateTime<Utc>) -> usize {
        let mut approvals = self.approvals.write().await;
        let before = approvals.len();
        approvals.retain(|_, a| a.expires_at > now);
        before - approvals.len()
    }
}
