//! Inbound message pipeline.
//!
//! Flow per webhook call:
//! 1. Normalize the payload (agent number and name patches)
//! 2. Sync the sender into the user registry (not for the agent)
//! 3. Append to the thread window
//! 4. Stop here for the agent's own messages
//! 5. Classify the window and dispatch exactly one workflow
//!
//! Store and registry failures never stop the pipeline. Workflow errors
//! propagate to the caller.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::pipeline::normalize::Normalizer;
use crate::pipeline::triage::IntentTriage;
use crate::pipeline::types::{Intent, WebhookPayload};
use crate::store::{StorageResult, ThreadStore, UserRegistry};
use crate::workflows::{WorkflowContext, WorkflowDispatcher, WorkflowOutcome};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncomingOutcome {
    pub thread_id: String,
    pub storage: StorageResult,
    /// `None` for the agent's own messages, which are stored but not answered.
    pub intent: Option<Intent>,
    pub workflow: Option<WorkflowOutcome>,
}

pub struct Pipeline {
    normalizer: Normalizer,
    threads: Arc<ThreadStore>,
    users: Arc<UserRegistry>,
    triage: IntentTriage,
    workflows: Arc<WorkflowDispatcher>,
}

impl Pipeline {
    pub fn new(
        normalizer: Normalizer,
        threads: Arc<ThreadStore>,
        users: Arc<UserRegistry>,
        triage: IntentTriage,
        workflows: Arc<WorkflowDispatcher>,
    ) -> Self {
        Self {
            normalizer,
            threads,
            users,
            triage,
            workflows,
        }
    }

    pub fn threads(&self) -> &Arc<ThreadStore> {
        &self.threads
    }

    pub fn workflows(&self) -> &Arc<WorkflowDispatcher> {
        &self.workflows
    }

    /// Process one webhook payload end to end.
    pub async fn handle_incoming(
        &self,
        payload: WebhookPayload,
    ) -> Result<IncomingOutcome, PipelineError> {
        if payload.thread_id.trim().is_empty() {
            return Err(PipelineError::InvalidPayload("thread_id is empty".into()));
        }
        if payload.message_id.trim().is_empty() {
            return Err(PipelineError::InvalidPayload("message_id is empty".into()));
        }

        let incoming = self.normalizer.normalize(payload);
        info!(
            thread_id = %incoming.thread_id,
            thread_type = incoming.thread_type.as_str(),
            message_id = %incoming.message.message_id,
            from_agent = incoming.from_agent,
            "Processing inbound message"
        );

        if !incoming.from_agent {
            let sync = self
                .users
                .ensure_user(incoming.sender_number(), incoming.sender_name())
                .await;
            debug!(thread_id = %incoming.thread_id, sync = ?sync, "User registry checked");
        }

        let storage = self
            .threads
            .append_message(&incoming.thread_id, incoming.message.clone())
            .await;

        if incoming.from_agent {
            debug!(thread_id = %incoming.thread_id, "Agent's own message stored, not replying");
            return Ok(IncomingOutcome {
                thread_id: incoming.thread_id,
                storage,
                intent: None,
                workflow: None,
            });
        }

        let mut window = self
            .threads
            .window_after(&incoming.thread_id, storage)
            .await;
        if window.is_empty() {
            window.push(incoming.message.clone());
        }

        let intent = self.triage.classify(&window).await;
        debug!(thread_id = %incoming.thread_id, intent = intent.response_type(), "Intent classified");

        let outcome = self
            .workflows
            .dispatch(
                intent,
                WorkflowContext {
                    thread_id: &incoming.thread_id,
                    thread_type: incoming.thread_type,
                    sender_number: incoming.sender_number(),
                    message: &incoming.message,
                    window: &window,
                },
            )
            .await?;

        Ok(IncomingOutcome {
            thread_id: incoming.thread_id,
            storage,
            intent: Some(intent),
            workflow: Some(outcome),
        })
    }
}
