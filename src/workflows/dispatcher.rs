//! Intent → executor dispatch.

use std::sync::Arc;

use tracing::info;

use crate::agent::ResponseGenerator;
use crate::channels::{OutboundDispatcher, OutboundTarget};
use crate::config::PipelineConfig;
use crate::error::WorkflowError;
use crate::pipeline::types::Intent;
use crate::store::ApprovalStore;
use crate::workflows::{WorkflowContext, WorkflowOutcome};

/// Workflow switches taken from [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub identity_url: String,
    pub require_email_approval: bool,
    pub approval_expire_minutes: u32,
}

impl From<&PipelineConfig> for WorkflowSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            identity_url: config.identity_url.clone(),
            require_email_approval: config.require_email_approval,
            approval_expire_minutes: config.approval_expire_minutes,
        }
    }
}

pub struct WorkflowDispatcher {
    pub(super) generator: Arc<ResponseGenerator>,
    pub(super) outbound: Arc<OutboundDispatcher>,
    pub(super) approvals: Arc<ApprovalStore>,
    pub(super) settings: WorkflowSettings,
}

impl WorkflowDispatcher {
    pub fn new(
        generator: Arc<ResponseGenerator>,
        outbound: Arc<OutboundDispatcher>,
        approvals: Arc<ApprovalStore>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            generator,
            outbound,
            approvals,
            settings,
        }
    }

    pub fn outbound(&self) -> &OutboundDispatcher {
        &self.outbound
    }

    /// Run the executor for `intent`. No retries.
    ///
    /// A thread without the identifier its type needs is a fatal error
    /// before any executor runs.
    pub async fn dispatch(
        &self,
        intent: Intent,
        ctx: WorkflowContext<'_>,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let target = OutboundTarget::resolve(
            ctx.thread_type,
            Some(ctx.thread_id),
            Some(ctx.sender_number),
        )?;

        info!(
            thread_id = %ctx.thread_id,
            intent = intent.response_type(),
            "Dispatching workflow"
        );

        let outcome = match intent {
            Intent::IdentityRequest => self.verify_identity(&ctx, &target).await?,
            Intent::EmailAction => self.handle_email(&ctx, &target).await?,
            Intent::TaskConfirmation => self.confirm_task(&ctx, &target).await?,
            Intent::SimpleResponse => self.default_reply(&ctx, &target).await?,
        };

        info!(thread_id = %ctx.thread_id, outcome = ?outcome, "Workflow finished");
        Ok(outcome)
    }
}
