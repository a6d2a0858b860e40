//! Email workflow: draft from the last few messages, then send or hold for approval.

use tracing::info;

use crate::channels::OutboundTarget;
use crate::error::WorkflowError;
use crate::pipeline::types::EmailDraft;
use crate::store::PendingApproval;
use crate::workflows::{WorkflowContext, WorkflowDispatcher, WorkflowOutcome};

pub const ASK_FOR_RECIPIENT: &str =
    "Who should I send this email to? Please share their email address.";

pub const TASK_COMPLETE: &str = "All done! Let me know if there's anything else I can help with.";

fn sent_notice(recipient: &str, subject: &str) -> String {
    format!("Email sent to {recipient} with the subject \"{subject}\".")
}

impl WorkflowDispatcher {
    pub(super) async fn handle_email(
        &self,
        ctx: &WorkflowContext<'_>,
        target: &OutboundTarget,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let draft = self.generator.generate_email(ctx.window).await?;

        let Some(recipient) = draft.recipient.clone() else {
            info!(thread_id = %ctx.thread_id, "Email draft has no recipient, asking for one");
            self.outbound.send_text(target, ASK_FOR_RECIPIENT).await?;
            return Ok(WorkflowOutcome::RecipientRequested);
        };

        if !self.settings.require_email_approval {
            return self.deliver_email(ctx, target, &draft, &recipient).await;
        }

        let question = self.generator.generate_confirmation(ctx.window, &draft).await?;
        self.approvals
            .save(PendingApproval::new(
                ctx.thread_id,
                ctx.thread_type,
                ctx.sender_number,
                draft,
                self.settings.approval_expire_minutes,
            ))
            .await;
        self.outbound.send_text(target, &question).await?;
        info!(thread_id = %ctx.thread_id, recipient = %recipient, "Email held for approval");
        Ok(WorkflowOutcome::ApprovalRequested { recipient })
    }

    /// Send the email, then tell the thread what went out and that the task is done.
    pub(super) async fn deliver_email(
        &self,
        ctx: &WorkflowContext<'_>,
        target: &OutboundTarget,
        draft: &EmailDraft,
        recipient: &str,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        self.outbound
            .send_email(recipient, &draft.subject, &draft.body)
            .await?;
        self.outbound
            .send_text(target, &sent_notice(recipient, &draft.subject))
            .await?;
        self.outbound.send_text(target, TASK_COMPLETE).await?;

        info!(thread_id = %ctx.thread_id, recipient = %recipient, "Email workflow completed");
        Ok(WorkflowOutcome::EmailSent {
            recipient: recipient.to_string(),
            subject: draft.subject.clone(),
        })
    }
}
