//! Response workflows, one per intent.
//!
//! [`WorkflowDispatcher::dispatch`] resolves the outbound target once and
//! runs exactly one executor. Executors generate text through the
//! [`ResponseGenerator`](crate::agent::ResponseGenerator) and send it through
//! the [`OutboundDispatcher`](crate::channels::OutboundDispatcher).

pub mod confirmation;
pub mod default_reply;
pub mod dispatcher;
pub mod email;
pub mod identity;

use serde::Serialize;

use crate::pipeline::types::{ThreadMessage, ThreadType};

pub use dispatcher::{WorkflowDispatcher, WorkflowSettings};

/// Everything an executor needs to know about the triggering message.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowContext<'a> {
    pub thread_id: &'a str,
    pub thread_type: ThreadType,
    pub sender_number: &'a str,
    /// The inbound message that triggered the dispatch.
    pub message: &'a ThreadMessage,
    /// Thread window after the message was stored, oldest first.
    pub window: &'a [ThreadMessage],
}

/// What an executor ended up doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Replied { sends: usize },
    /// Generation or delivery failed and the fixed apology went out instead.
    Apologized,
    IdentitySent { sends: usize },
    EmailSent { recipient: String, subject: String },
    RecipientRequested,
    ApprovalRequested { recipient: String },
    ApprovalPending,
    ApprovalCancelled,
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::agent::{AgentProfile, ResponseGenerator};
    use crate::channels::{
        EmailMessage, EmailTransport, GroupMessage, IndividualMessage, MessagingGateway,
        OutboundDispatcher,
    };
    use crate::error::{GatewayError, LlmError};
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
    use crate::pipeline::types::ThreadMessage;
    use crate::store::{ApprovalStore, DurableHandle, FallbackStore};

    use super::{WorkflowDispatcher, WorkflowSettings};

    pub const AGENT: &str = "+15550000";

    /// Replies with queued answers in order; errors once the queue runs dry.
    #[derive(Default)]
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        pub calls: Mutex<usize>,
    }

    impl ScriptedLlm {
        pub fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            *self.calls.lock().unwrap() += 1;
            match self.replies.lock().unwrap().pop_front() {
                Some(content) => Ok(CompletionResponse {
                    content,
                    input_tokens: 0,
                    output_tokens: 0,
                    finish_reason: FinishReason::Stop,
                }),
                None => Err(LlmError::RequestFailed {
                    provider: "scripted".into(),
                    reason: "no scripted reply".into(),
                }),
            }
        }
    }

    /// Records every send. `fail_first` makes the first N chat sends fail.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub texts: Mutex<Vec<String>>,
        pub emails: Mutex<Vec<EmailMessage>>,
        pub fail_first: Mutex<usize>,
        pub fail_email: bool,
    }

    impl RecordingGateway {
        fn chat(&self, content: &str) -> Result<(), GatewayError> {
            let mut remaining = self.fail_first.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::SendFailed {
                    operation: "send".into(),
                    reason: "unavailable".into(),
                });
            }
            self.texts.lock().unwrap().push(content.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl MessagingGateway for RecordingGateway {
        async fn send_individual(&self, message: &IndividualMessage) -> Result<(), GatewayError> {
            self.chat(&message.content)
        }

        async fn send_group(&self, message: &GroupMessage) -> Result<(), GatewayError> {
            self.chat(&message.content)
        }
    }

    #[async_trait]
    impl EmailTransport for RecordingGateway {
        async fn send_email(&self, email: &EmailMessage) -> Result<(), GatewayError> {
            if self.fail_email {
                return Err(GatewayError::Rejected {
                    operation: "send_email".into(),
                    status: 500,
                    body: String::new(),
                });
            }
            self.emails.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    pub fn message(id: &str, sender: &str, name: &str, content: &str) -> ThreadMessage {
        ThreadMessage {
            message_id: id.into(),
            content: content.into(),
            sender_number: sender.into(),
            sender_name: name.into(),
            timestamp: "2025-01-01T00:00:00Z".into(),
        }
    }

    pub fn dispatcher(
        llm: Arc<ScriptedLlm>,
        gateway: Arc<RecordingGateway>,
        require_email_approval: bool,
    ) -> (WorkflowDispatcher, Arc<ApprovalStore>) {
        let generator = Arc::new(ResponseGenerator::new(
            llm,
            AgentProfile::default(),
            Some(AGENT.to_string()),
        ));
        let outbound = Arc::new(OutboundDispatcher::new(
            gateway.clone(),
            gateway,
            AGENT,
            "whatsapp",
            Some("agent@a1base.ai".into()),
            false,
        ));
        let approvals = Arc::new(ApprovalStore::new(
            Arc::new(DurableHandle::disabled()),
            Arc::new(FallbackStore::new(Some(AGENT.to_string()))),
        ));
        let settings = WorkflowSettings {
            identity_url: "https://example.com/identity".into(),
            require_email_approval,
            approval_expire_minutes: 30,
        };
        (
            WorkflowDispatcher::new(generator, outbound, approvals.clone(), settings),
            approvals,
        )
    }
}
