//! Thread store: bounded message windows with durable-first writes.
//!
//! Every write tries the durable store. When it is unconfigured or any step
//! fails, the whole call is redone against the in-memory fallback (subject
//! to [`FallbackPolicy`]). Writes for the same thread are serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::config::FallbackPolicy;
use crate::error::DatabaseError;
use crate::pipeline::types::{Thread, ThreadMessage, truncate_window};
use crate::store::durable::DurableHandle;
use crate::store::memory::FallbackStore;
use crate::store::traits::DurableStore;

/// Where a write landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageResult {
    Durable,
    Fallback,
    /// Durable write unavailable and the fallback is disabled.
    Failed,
}

/// Outcome of replaying diverged fallback threads into the durable store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub replayed: usize,
    pub failed: usize,
    /// True when no durable store was reachable, so nothing was attempted.
    pub skipped: bool,
}

/// Per-thread async locks, created on demand and dropped once unused.
#[derive(Default)]
struct ThreadLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadLocks {
    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn acquire(&self, thread_id: &str) -> ThreadLockGuard<'_> {
        let lock = Arc::clone(self.map().entry(thread_id.to_string()).or_default());
        ThreadLockGuard {
            locks: self,
            thread_id: thread_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Drop the entry when the map holds the last reference to it.
    fn release(&self, thread_id: &str) {
        let mut map = self.map();
        if map
            .get(thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(thread_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

/// Holds a thread's lock; releasing it evicts the map entry if nobody is waiting.
struct ThreadLockGuard<'a> {
    locks: &'a ThreadLocks,
    thread_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.thread_id);
    }
}

pub struct ThreadStore {
    durable: Arc<DurableHandle>,
    fallback: Arc<FallbackStore>,
    policy: FallbackPolicy,
    window: usize,
    agent_number: Option<String>,
    locks: ThreadLocks,
}

impl ThreadStore {
    pub fn new(
        durable: Arc<DurableHandle>,
        fallback: Arc<FallbackStore>,
        policy: FallbackPolicy,
        window: usize,
        agent_number: Option<String>,
    ) -> Self {
        Self {
            durable,
            fallback,
            policy,
            window,
            agent_number,
            locks: ThreadLocks::default(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window
    }

    /// Resolve the durable store, logging (not returning) open failures.
    async fn durable(&self) -> Option<Arc<dyn DurableStore>> {
        match self.durable.get().await {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Durable store could not be opened");
                None
            }
        }
    }

    /// Fetch a thread, durable first, then the fallback map.
    pub async fn get_thread(&self, thread_id: &str) -> Option<Thread> {
        if let Some(store) = self.durable().await {
            match store.get_thread(thread_id).await {
                Ok(Some(thread)) => return Some(thread),
                Ok(None) => {}
                Err(e) => warn!(thread_id = %thread_id, error = %e, "Durable thread read failed"),
            }
        }
        self.fallback.get_thread(thread_id).await
    }

    /// Read the current window from the backend a previous write landed in.
    pub async fn window_after(&self, thread_id: &str, written: StorageResult) -> Vec<ThreadMessage> {
        if written == StorageResult::Durable
            && let Some(store) = self.durable().await
        {
            match store.get_thread(thread_id).await {
                Ok(Some(thread)) => return thread.messages,
                Ok(None) => {}
                Err(e) => warn!(thread_id = %thread_id, error = %e, "Durable window read failed"),
            }
        }
        self.fallback
            .get_thread(thread_id)
            .await
            .map(|t| t.messages)
            .unwrap_or_default()
    }

    /// Create a thread with initial messages (capped to the window) and participants.
    pub async fn create_thread(
        &self,
        thread_id: &str,
        initial_messages: Vec<ThreadMessage>,
        participants: &[String],
    ) -> StorageResult {
        let _lock = self.locks.acquire(thread_id).await;

        let mut thread = Thread::new(thread_id);
        thread.messages = initial_messages;
        truncate_window(&mut thread.messages, self.window);
        for p in participants {
            thread.add_participant(p);
        }

        let durable_result = match self.durable().await {
            Some(store) => Some(store.create_thread(&thread).await.map(|_| ())),
            None => None,
        };
        match self
            .settle(thread_id, "create_thread", durable_result)
            .await
        {
            StorageResult::Fallback => {
                self.fallback.put_thread(thread).await;
                StorageResult::Fallback
            }
            other => other,
        }
    }

    /// Append a message to a thread's window, creating the thread if needed.
    pub async fn append_message(&self, thread_id: &str, message: ThreadMessage) -> StorageResult {
        let _lock = self.locks.acquire(thread_id).await;

        let durable_result = match self.durable().await {
            Some(store) => Some(self.append_durable(store.as_ref(), thread_id, &message).await),
            None => None,
        };
        let result = self
            .settle(thread_id, "append_message", durable_result)
            .await;
        if result == StorageResult::Fallback {
            self.fallback
                .append_message(thread_id, message, self.window)
                .await;
        }
        result
    }

    async fn append_durable(
        &self,
        store: &dyn DurableStore,
        thread_id: &str,
        message: &ThreadMessage,
    ) -> Result<(), DatabaseError> {
        match store.get_thread(thread_id).await? {
            Some(mut thread) => {
                let before = thread.participants.clone();
                thread.normalize_participants();
                let sender_added = thread.add_participant(&message.sender_number);

                if !thread.append(message.clone(), self.window) {
                    debug!(thread_id = %thread_id, message_id = %message.message_id, "Duplicate message ignored");
                    return Ok(());
                }
                store
                    .update_thread_messages(thread_id, &thread.messages)
                    .await?;
                if sender_added || thread.participants != before {
                    store
                        .update_thread_participants(thread_id, &thread.participants)
                        .await?;
                }
            }
            None => {
                let mut thread = Thread::new(thread_id);
                thread.append(message.clone(), self.window);
                thread.add_participant(&message.sender_number);
                if let Some(agent) = &self.agent_number {
                    thread.add_participant(agent);
                }
                store.create_thread(&thread).await?;
            }
        }
        Ok(())
    }

    /// Add a participant to a thread if not already present.
    pub async fn upsert_participant(&self, thread_id: &str, number: &str) -> StorageResult {
        let _lock = self.locks.acquire(thread_id).await;

        let durable_result = match self.durable().await {
            Some(store) => Some(upsert_durable(store.as_ref(), thread_id, number).await),
            None => None,
        };
        let result = self
            .settle(thread_id, "upsert_participant", durable_result)
            .await;
        if result == StorageResult::Fallback {
            self.fallback.upsert_participant(thread_id, number).await;
        }
        result
    }

    /// Decide where a write landed given the durable attempt (`None` = unconfigured).
    async fn settle(
        &self,
        thread_id: &str,
        operation: &str,
        durable_result: Option<Result<(), DatabaseError>>,
    ) -> StorageResult {
        let durable_failed = match durable_result {
            Some(Ok(())) => return StorageResult::Durable,
            Some(Err(e)) => {
                warn!(thread_id = %thread_id, operation, error = %e, "Durable write failed");
                true
            }
            None => self.durable.is_configured(),
        };

        match self.policy {
            FallbackPolicy::InMemory => {
                if durable_failed {
                    self.fallback.mark_diverged(thread_id).await;
                }
                debug!(thread_id = %thread_id, operation, "Using in-memory fallback");
                StorageResult::Fallback
            }
            FallbackPolicy::Disabled => {
                warn!(thread_id = %thread_id, operation, "Write dropped, fallback disabled");
                StorageResult::Failed
            }
        }
    }

    /// Merge threads written to the fallback during a durable outage back into
    /// the durable store. Messages are merged by id, put back in arrival order
    /// and re-capped to the window.
    pub async fn replay_fallback(&self) -> ReplayReport {
        let Some(store) = self.durable().await else {
            return ReplayReport {
                skipped: true,
                ..Default::default()
            };
        };

        let mut report = ReplayReport::default();
        for thread_id in self.fallback.diverged_threads().await {
            let _lock = self.locks.acquire(&thread_id).await;

            let Some(cached) = self.fallback.get_thread(&thread_id).await else {
                self.fallback.remove_thread(&thread_id).await;
                continue;
            };
            match self.merge_into_durable(store.as_ref(), cached).await {
                Ok(()) => {
                    self.fallback.remove_thread(&thread_id).await;
                    report.replayed += 1;
                }
                Err(e) => {
                    warn!(thread_id = %thread_id, error = %e, "Replay failed, will retry");
                    report.failed += 1;
                }
            }
        }
        if report.replayed + report.failed > 0 {
            info!(replayed = report.replayed, failed = report.failed, "Fallback replay finished");
        }
        report
    }

    async fn merge_into_durable(
        &self,
        store: &dyn DurableStore,
        cached: Thread,
    ) -> Result<(), DatabaseError> {
        match store.get_thread(&cached.id).await? {
            Some(mut thread) => {
                thread.normalize_participants();
                for p in &cached.participants {
                    thread.add_participant(p);
                }
                for m in cached.messages {
                    if !thread.contains_message(&m.message_id) {
                        thread.messages.push(m);
                    }
                }
                sort_by_arrival(&mut thread.messages);
                truncate_window(&mut thread.messages, self.window);
                store
                    .update_thread_messages(&thread.id, &thread.messages)
                    .await?;
                store
                    .update_thread_participants(&thread.id, &thread.participants)
                    .await?;
            }
            None => {
                store.create_thread(&cached).await?;
            }
        }
        Ok(())
    }
}

/// Participant upsert against the durable store. A missing thread is created
/// holding just `number`; an existing one is only written when `number` is new
/// or legacy participant entries needed normalizing.
async fn upsert_durable(
    store: &dyn DurableStore,
    thread_id: &str,
    number: &str,
) -> Result<(), DatabaseError> {
    match store.get_thread(thread_id).await? {
        Some(mut thread) => {
            let before = thread.participants.clone();
            thread.normalize_participants();
            let added = thread.add_participant(number);
            if added || thread.participants != before {
                store
                    .update_thread_participants(thread_id, &thread.participants)
                    .await?;
            }
        }
        None => {
            let mut thread = Thread::new(thread_id);
            thread.add_participant(number);
            store.create_thread(&thread).await?;
        }
    }
    Ok(())
}

/// Order messages by timestamp (RFC 3339 sorts lexically), ties broken by id.
fn sort_by_arrival(messages: &mut [ThreadMessage]) {
    messages.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.message_id.cmp(&b.message_id))
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::pipeline::types::User;
    use crate::store::approvals::PendingApproval;
    use crate::store::libsql_backend::LibSqlBackend;

    /// A durable store whose every call fails.
    struct BrokenStore;

    fn broken() -> DatabaseError {
        DatabaseError::Query("connection refused".into())
    }

    #[async_trait]
    impl DurableStore for BrokenStore {
        async fn get_thread(&self, _: &str) -> Result<Option<Thread>, DatabaseError> {
            Err(broken())
        }
        async fn create_thread(&self, _: &Thread) -> Result<String, DatabaseError> {
            Err(broken())
        }
        async fn update_thread_messages(
            &self,
            _: &str,
            _: &[ThreadMessage],
        ) -> Result<(), DatabaseError> {
            Err(broken())
        }
        async fn update_thread_participants(&self, _: &str, _: &[String]) -> Result<(), DatabaseError> {
            Err(broken())
        }
        async fn get_user_by_phone(&self, _: i64) -> Result<Option<User>, DatabaseError> {
            Err(broken())
        }
        async fn create_user(&self, _: &str, _: i64) -> Result<User, DatabaseError> {
            Err(broken())
        }
        async fn update_user_name(&self, _: i64, _: &str) -> Result<(), DatabaseError> {
            Err(broken())
        }
        async fn save_pending_approval(&self, _: &PendingApproval) -> Result<(), DatabaseError> {
            Err(broken())
        }
        async fn get_pending_approval(&self, _: &str) -> Result<Option<PendingApproval>, DatabaseError> {
            Err(broken())
        }
        async fn delete_pending_approval(&self, _: &str) -> Result<(), DatabaseError> {
            Err(broken())
        }
        async fn delete_expired_approvals(&self, _: DateTime<Utc>) -> Result<u64, DatabaseError> {
            Err(broken())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FailStep {
        Never,
        CreateThread,
        UpdateParticipants,
    }

    /// A libsql-backed store that fails one chosen write step until healed,
    /// and counts participant writes.
    struct FlakyStore {
        inner: Arc<LibSqlBackend>,
        fail_on: FailStep,
        healed: AtomicBool,
        participant_writes: AtomicUsize,
    }

    impl FlakyStore {
        fn new(inner: Arc<LibSqlBackend>, fail_on: FailStep) -> Self {
            Self {
                inner,
                fail_on,
                healed: AtomicBool::new(false),
                participant_writes: AtomicUsize::new(0),
            }
        }

        fn check(&self, step: FailStep) -> Result<(), DatabaseError> {
            if self.fail_on == step && !self.healed.load(Ordering::SeqCst) {
                return Err(broken());
            }
            Ok(())
        }

        fn heal(&self) {
            self.healed.store(true, Ordering::SeqCst);
        }

        fn participant_writes(&self) -> usize {
            self.participant_writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DurableStore for FlakyStore {
        async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>, DatabaseError> {
            self.inner.get_thread(thread_id).await
        }
        async fn create_thread(&self, thread: &Thread) -> Result<String, DatabaseError> {
            self.check(FailStep::CreateThread)?;
            self.inner.create_thread(thread).await
        }
        async fn update_thread_messages(
            &self,
            thread_id: &str,
            messages: &[ThreadMessage],
        ) -> Result<(), DatabaseError> {
            self.inner.update_thread_messages(thread_id, messages).await
        }
        async fn update_thread_participants(
            &self,
            thread_id: &str,
            participants: &[String],
        ) -> Result<(), DatabaseError> {
            self.check(FailStep::UpdateParticipants)?;
            self.participant_writes.fetch_add(1, Ordering::SeqCst);
            self.inner
                .update_thread_participants(thread_id, participants)
                .await
        }
        async fn get_user_by_phone(&self, phone: i64) -> Result<Option<User>, DatabaseError> {
            self.inner.get_user_by_phone(phone).await
        }
        async fn create_user(&self, name: &str, phone: i64) -> Result<User, DatabaseError> {
            self.inner.create_user(name, phone).await
        }
        async fn update_user_name(&self, phone: i64, name: &str) -> Result<(), DatabaseError> {
            self.inner.update_user_name(phone, name).await
        }
        async fn save_pending_approval(&self, approval: &PendingApproval) -> Result<(), DatabaseError> {
            self.inner.save_pending_approval(approval).await
        }
        async fn get_pending_approval(
            &self,
            thread_id: &str,
        ) -> Result<Option<PendingApproval>, DatabaseError> {
            self.inner.get_pending_approval(thread_id).await
        }
        async fn delete_pending_approval(&self, thread_id: &str) -> Result<(), DatabaseError> {
            self.inner.delete_pending_approval(thread_id).await
        }
        async fn delete_expired_approvals(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
            self.inner.delete_expired_approvals(now).await
        }
    }

    const AGENT: &str = "+15550000";

    fn message(id: &str, sender: &str) -> ThreadMessage {
        ThreadMessage {
            message_id: id.into(),
            content: format!("body {id}"),
            sender_number: sender.into(),
            sender_name: "Alice".into(),
            timestamp: format!("2025-01-01T00:00:{id:0>2}Z"),
        }
    }

    fn store_with(durable: DurableHandle, policy: FallbackPolicy) -> (ThreadStore, Arc<FallbackStore>) {
        let fallback = Arc::new(FallbackStore::new(Some(AGENT.into())));
        let store = ThreadStore::new(
            Arc::new(durable),
            fallback.clone(),
            policy,
            10,
            Some(AGENT.into()),
        );
        (store, fallback)
    }

    async fn flaky_store(
        fail_on: FailStep,
    ) -> (ThreadStore, Arc<FlakyStore>, Arc<LibSqlBackend>, Arc<FallbackStore>) {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let flaky = Arc::new(FlakyStore::new(backend.clone(), fail_on));
        let (store, fallback) = store_with(
            DurableHandle::with_store(flaky.clone()),
            FallbackPolicy::InMemory,
        );
        (store, flaky, backend, fallback)
    }

    async fn libsql_store() -> (ThreadStore, Arc<LibSqlBackend>, Arc<FallbackStore>) {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let (store, fallback) = store_with(
            DurableHandle::with_store(backend.clone()),
            FallbackPolicy::InMemory,
        );
        (store, backend, fallback)
    }

    #[tokio::test]
    async fn new_thread_gets_sender_and_agent_participants() {
        let (store, backend, fallback) = libsql_store().await;
        let result = store.append_message("t1", message("1", "+15550001")).await;
        assert_eq!(result, StorageResult::Durable);

        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        assert_eq!(thread.messages.len(), 1);
        assert_eq!(thread.participants, vec!["15550001", "15550000"]);
        assert!(fallback.get_thread("t1").await.is_none());
    }

    #[tokio::test]
    async fn eleven_messages_keep_last_ten() {
        let (store, backend, _) = libsql_store().await;
        for i in 1..=11 {
            store
                .append_message("t1", message(&i.to_string(), "+15550001"))
                .await;
        }
        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        assert_eq!(thread.messages.len(), 10);
        assert!(!thread.contains_message("1"));
        assert_eq!(thread.messages.first().unwrap().message_id, "2");
        assert_eq!(thread.messages.last().unwrap().message_id, "11");
    }

    #[tokio::test]
    async fn new_sender_is_added_to_existing_thread() {
        let (store, backend, _) = libsql_store().await;
        store.append_message("t1", message("1", "+15550001")).await;
        store.append_message("t1", message("2", "15550002")).await;
        store.append_message("t1", message("3", "+15550002")).await;

        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        assert_eq!(thread.participants, vec!["15550001", "15550000", "15550002"]);
    }

    #[tokio::test]
    async fn legacy_plus_participants_are_normalized_on_append() {
        let (store, backend, _) = libsql_store().await;
        let mut legacy = Thread::new("t1");
        legacy.participants = vec!["+15550001".into(), "15550001".into()];
        backend.create_thread(&legacy).await.unwrap();

        store.append_message("t1", message("1", "+15550001")).await;
        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        assert_eq!(thread.participants, vec!["15550001"]);
    }

    #[tokio::test]
    async fn redelivered_message_is_not_duplicated() {
        let (store, backend, _) = libsql_store().await;
        store.append_message("t1", message("1", "+15550001")).await;
        store.append_message("t1", message("1", "+15550001")).await;
        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        assert_eq!(thread.messages.len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_store_uses_fallback_without_divergence() {
        let (store, fallback) = store_with(DurableHandle::disabled(), FallbackPolicy::InMemory);
        let result = store.append_message("t1", message("1", "+15550001")).await;
        assert_eq!(result, StorageResult::Fallback);
        assert_eq!(store.get_thread("t1").await.unwrap().messages.len(), 1);
        assert!(fallback.diverged_threads().await.is_empty());
    }

    #[tokio::test]
    async fn failing_store_falls_back_and_marks_divergence() {
        let (store, fallback) = store_with(
            DurableHandle::with_store(Arc::new(BrokenStore)),
            FallbackPolicy::InMemory,
        );
        let result = store.append_message("t1", message("1", "+15550001")).await;
        assert_eq!(result, StorageResult::Fallback);

        let window = store.window_after("t1", result).await;
        assert_eq!(window.len(), 1);
        assert_eq!(fallback.diverged_threads().await, vec!["t1"]);
    }

    #[tokio::test]
    async fn disabled_fallback_reports_failure() {
        let (store, fallback) = store_with(
            DurableHandle::with_store(Arc::new(BrokenStore)),
            FallbackPolicy::Disabled,
        );
        let result = store.append_message("t1", message("1", "+15550001")).await;
        assert_eq!(result, StorageResult::Failed);
        assert!(fallback.get_thread("t1").await.is_none());
    }

    #[tokio::test]
    async fn create_thread_caps_and_dedups() {
        let (store, backend, _) = libsql_store().await;
        let initial: Vec<_> = (1..=12).map(|i| message(&i.to_string(), "+1")).collect();
        let participants = vec!["+1".to_string(), "1".to_string(), "+2".to_string()];
        assert_eq!(
            store.create_thread("t1", initial, &participants).await,
            StorageResult::Durable
        );
        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        assert_eq!(thread.messages.len(), 10);
        assert_eq!(thread.participants, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn upsert_participant_is_idempotent() {
        let (store, backend, _) = libsql_store().await;
        store.append_message("t1", message("1", "+15550001")).await;
        store.upsert_participant("t1", "+15550009").await;
        store.upsert_participant("t1", "15550009").await;
        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        assert_eq!(thread.participants.iter().filter(|p| *p == "15550009").count(), 1);
    }

    #[tokio::test]
    async fn concurrent_appends_lose_nothing() {
        let (store, backend, _) = libsql_store().await;
        let store = Arc::new(store);
        let tasks: Vec<_> = (1..=8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .append_message("t1", message(&i.to_string(), "+15550001"))
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap(), StorageResult::Durable);
        }
        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        assert_eq!(thread.messages.len(), 8);
    }

    #[tokio::test]
    async fn replay_merges_diverged_threads() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let fallback = Arc::new(FallbackStore::new(Some(AGENT.into())));

        // Durable copy has messages 1..=3.
        let mut durable_thread = Thread::new("t1");
        for i in 1..=3 {
            durable_thread.append(message(&i.to_string(), "+15550001"), 10);
        }
        durable_thread.add_participant("+15550001");
        backend.create_thread(&durable_thread).await.unwrap();

        // Outage copy overlaps on 3 and adds 4..=5 from a new sender.
        for i in 3..=5 {
            fallback
                .append_message("t1", message(&i.to_string(), "+15550002"), 10)
                .await;
        }
        fallback.mark_diverged("t1").await;

        let store = ThreadStore::new(
            Arc::new(DurableHandle::with_store(backend.clone())),
            fallback.clone(),
            FallbackPolicy::InMemory,
            4,
            Some(AGENT.into()),
        );
        let report = store.replay_fallback().await;
        assert_eq!(report, ReplayReport { replayed: 1, failed: 0, skipped: false });

        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        let ids: Vec<_> = thread.messages.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "4", "5"]);
        assert!(thread.has_participant("15550002"));
        assert!(fallback.diverged_threads().await.is_empty());
        assert!(fallback.get_thread("t1").await.is_none());
    }

    #[tokio::test]
    async fn replay_without_durable_store_is_skipped() {
        let (store, _) = store_with(DurableHandle::disabled(), FallbackPolicy::InMemory);
        assert!(store.replay_fallback().await.skipped);
    }

    #[tokio::test]
    async fn participant_write_failure_after_messages_falls_back() {
        let (store, flaky, backend, fallback) = flaky_store(FailStep::UpdateParticipants).await;
        let mut existing = Thread::new("t1");
        existing.append(message("1", "+15550001"), 10);
        existing.add_participant("+15550001");
        backend.create_thread(&existing).await.unwrap();

        // New sender: the messages write succeeds, the participants write fails.
        let result = store.append_message("t1", message("2", "+15550002")).await;
        assert_eq!(result, StorageResult::Fallback);

        let window = store.window_after("t1", result).await;
        assert!(window.iter().any(|m| m.message_id == "2"));
        assert!(fallback.get_thread("t1").await.unwrap().has_participant("15550002"));
        assert_eq!(fallback.diverged_threads().await, vec!["t1"]);

        flaky.heal();
        let report = store.replay_fallback().await;
        assert_eq!(report.replayed, 1);
        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        let ids: Vec<_> = thread.messages.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(thread.has_participant("15550002"));
    }

    #[tokio::test]
    async fn create_failure_for_new_thread_falls_back() {
        let (store, _, backend, fallback) = flaky_store(FailStep::CreateThread).await;
        let result = store.append_message("t1", message("1", "+15550001")).await;
        assert_eq!(result, StorageResult::Fallback);

        assert!(backend.get_thread("t1").await.unwrap().is_none());
        let window = store.window_after("t1", result).await;
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].message_id, "1");
        assert_eq!(fallback.diverged_threads().await, vec!["t1"]);
    }

    #[tokio::test]
    async fn upsert_participant_creates_missing_thread() {
        let (store, backend, fallback) = libsql_store().await;
        assert_eq!(
            store.upsert_participant("t9", "+15550009").await,
            StorageResult::Durable
        );
        let thread = backend.get_thread("t9").await.unwrap().unwrap();
        assert_eq!(thread.participants, vec!["15550009"]);
        assert!(thread.messages.is_empty());
        assert!(fallback.get_thread("t9").await.is_none());
    }

    #[tokio::test]
    async fn upsert_participant_writes_only_new_numbers() {
        let (store, flaky, _, _) = flaky_store(FailStep::Never).await;
        store.append_message("t1", message("1", "+15550001")).await;
        let baseline = flaky.participant_writes();

        store.upsert_participant("t1", "15550001").await;
        store.upsert_participant("t1", "+15550000").await;
        assert_eq!(flaky.participant_writes(), baseline);

        store.upsert_participant("t1", "+15550009").await;
        assert_eq!(flaky.participant_writes(), baseline + 1);
    }

    #[tokio::test]
    async fn replay_keeps_newest_messages_in_arrival_order() {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let fallback = Arc::new(FallbackStore::new(Some(AGENT.into())));

        // Written during the outage, before the store recovered.
        fallback
            .append_message("t1", message("1", "+15550001"), 2)
            .await;
        fallback.mark_diverged("t1").await;

        let mut durable_thread = Thread::new("t1");
        durable_thread.append(message("2", "+15550001"), 2);
        durable_thread.append(message("3", "+15550001"), 2);
        durable_thread.add_participant("+15550001");
        backend.create_thread(&durable_thread).await.unwrap();

        let store = ThreadStore::new(
            Arc::new(DurableHandle::with_store(backend.clone())),
            fallback.clone(),
            FallbackPolicy::InMemory,
            2,
            Some(AGENT.into()),
        );
        assert_eq!(store.replay_fallback().await.replayed, 1);

        let thread = backend.get_thread("t1").await.unwrap().unwrap();
        let ids: Vec<_> = thread.messages.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[tokio::test]
    async fn thread_locks_are_released_after_writes() {
        let (store, _, _) = libsql_store().await;
        let store = Arc::new(store);
        let tasks: Vec<_> = (1..=6)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let thread_id = format!("t{}", i % 2);
                    store
                        .append_message(&thread_id, message(&i.to_string(), "+15550001"))
                        .await
                })
            })
            .collect();
        futures::future::join_all(tasks).await;
        store.upsert_participant("t0", "+15550009").await;
        store.replay_fallback().await;

        assert_eq!(store.locks.len(), 0);
    }
}
