//! Task confirmation: resolve the thread's pending email approval.

use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::channels::OutboundTarget;
use crate::error::WorkflowError;
use crate::workflows::{WorkflowContext, WorkflowDispatcher, WorkflowOutcome};

pub const CANCELLED: &str = "Okay, I won't send that email.";

static AFFIRMATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(yes|yeah|yep|yup|y|sure|ok|okay|confirm(ed)?|approved?|send( it)?|go ahead|do it|please do)\b")
        .expect("valid regex")
});

static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(no|nope|nah|n|cancel|stop|don'?t|do not|never ?mind)\b")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Unclear,
}

/// Read a yes/no answer from the start of a reply.
pub fn decide(reply: &str) -> Decision {
    if NEGATIVE.is_match(reply) {
        Decision::Reject
    } else if AFFIRMATIVE.is_match(reply) {
        Decision::Approve
    } else {
        Decision::Unclear
    }
}

impl WorkflowDispatcher {
    pub(super) async fn confirm_task(
        &self,
        ctx: &WorkflowContext<'_>,
        target: &OutboundTarget,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let Some(pending) = self.approvals.active(ctx.thread_id).await else {
            return self.default_reply(ctx, target).await;
        };

        match decide(&ctx.message.content) {
            Decision::Approve => {
                self.approvals.clear(ctx.thread_id).await;
                info!(thread_id = %ctx.thread_id, "Pending email approved");
                let Some(recipient) = pending.draft.recipient.clone() else {
                    self.outbound
                        .send_text(target, super::email::ASK_FOR_RECIPIENT)
                        .await?;
                    return Ok(WorkflowOutcome::RecipientRequested);
                };
                self.deliver_email(ctx, target, &pending.draft, &recipient)
                    .await
            }
            Decision::Reject => {
                self.approvals.clear(ctx.thread_id).await;
                info!(thread_id = %ctx.thread_id, "Pending email cancelled");
                self.outbound.send_text(target, CANCELLED).await?;
                Ok(WorkflowOutcome::ApprovalCancelled)
            }
            Decision::Unclear => {
                let question = self
                    .generator
                    .generate_confirmation(ctx.window, &pending.draft)
                    .await?;
                self.outbound.send_text(target, &question).await?;
                Ok(WorkflowOutcome::ApprovalPending)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::types::{EmailDraft, Intent, ThreadMessage, ThreadType};
    use crate::store::PendingApproval;
    use crate::workflows::email::TASK_COMPLETE;
    use crate::workflows::test_support::{RecordingGateway, ScriptedLlm, dispatcher, message};

    fn ctx<'a>(msg: &'a ThreadMessage, window: &'a [ThreadMessage]) -> WorkflowContext<'a> {
        WorkflowContext {
            thread_id: "t1",
            thread_type: ThreadType::Individual,
            sender_number: "+1666",
            message: msg,
            window,
        }
    }

    fn pending() -> PendingApproval {
        PendingApproval::new(
            "t1",
            ThreadType::Individual,
            "+1666",
            EmailDraft {
                recipient: Some("bob@example.com".into()),
                subject: "Project update".into(),
                body: "On track.".into(),
            },
            30,
        )
    }

    #[test]
    fn reads_yes_and_no() {
        assert_eq!(decide("Yes please"), Decision::Approve);
        assert_eq!(decide("  send it"), Decision::Approve);
        assert_eq!(decide("ok"), Decision::Approve);
        assert_eq!(decide("No, hold off"), Decision::Reject);
        assert_eq!(decide("don't send it"), Decision::Reject);
        assert_eq!(decide("nevermind"), Decision::Reject);
        assert_eq!(decide("what was the subject again?"), Decision::Unclear);
        assert_eq!(decide("yesterday was fine"), Decision::Unclear);
    }

    #[tokio::test]
    async fn approval_sends_the_held_email() {
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let gateway = Arc::new(RecordingGateway::default());
        let (workflows, approvals) = dispatcher(llm, gateway.clone(), true);
        approvals.save(pending()).await;

        let msg = message("m2", "+1666", "Alice", "yes");
        let window = vec![msg.clone()];
        let outcome = workflows
            .dispatch(Intent::TaskConfirmation, ctx(&msg, &window))
            .await
            .unwrap();

        assert!(matches!(outcome, WorkflowOutcome::EmailSent { .. }));
        assert_eq!(gateway.emails.lock().unwrap()[0].subject, "Project update");
        assert_eq!(gateway.texts.lock().unwrap().last().unwrap(), TASK_COMPLETE);
        assert!(approvals.active("t1").await.is_none());
    }

    #[tokio::test]
    async fn rejection_cancels() {
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let gateway = Arc::new(RecordingGateway::default());
        let (workflows, approvals) = dispatcher(llm, gateway.clone(), true);
        approvals.save(pending()).await;

        let msg = message("m2", "+1666", "Alice", "no thanks");
        let window = vec![msg.clone()];
        let outcome = workflows
            .dispatch(Intent::TaskConfirmation, ctx(&msg, &window))
            .await
            .unwrap();

        assert_eq!(outcome, WorkflowOutcome::ApprovalCancelled);
        assert!(gateway.emails.lock().unwrap().is_empty());
        assert_eq!(*gateway.texts.lock().unwrap(), vec![CANCELLED.to_string()]);
        assert!(approvals.active("t1").await.is_none());
    }

    #[tokio::test]
    async fn unclear_answer_asks_again() {
        let llm = Arc::new(ScriptedLlm::new(&["Just to confirm: send it to Bob?"]));
        let gateway = Arc::new(RecordingGateway::default());
        let (workflows, approvals) = dispatcher(llm, gateway.clone(), true);
        approvals.save(pending()).await;

        let msg = message("m2", "+1666", "Alice", "what was the subject?");
        let window = vec![msg.clone()];
        let outcome = workflows
            .dispatch(Intent::TaskConfirmation, ctx(&msg, &window))
            .await
            .unwrap();

        assert_eq!(outcome, WorkflowOutcome::ApprovalPending);
        assert!(approvals.active("t1").await.is_some());
    }

    #[tokio::test]
    async fn without_pending_approval_replies_normally() {
        let llm = Arc::new(ScriptedLlm::new(&["Sure thing."]));
        let gateway = Arc::new(RecordingGateway::default());
        let (workflows, _) = dispatcher(llm, gateway.clone(), true);

        let msg = message("m2", "+1666", "Alice", "yes");
        let window = vec![msg.clone()];
        let outcome = workflows
            .dispatch(Intent::TaskConfirmation, ctx(&msg, &window))
            .await
            .unwrap();

        assert_eq!(outcome, WorkflowOutcome::Replied { sends: 1 });
        assert!(gateway.emails.lock().unwrap().is_empty());
    }
}
