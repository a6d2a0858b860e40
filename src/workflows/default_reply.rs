//! Default reply, with a fixed apology when generation or delivery fails.

use tracing::{error, warn};

use crate::agent::prompts;
use crate::channels::OutboundTarget;
use crate::error::WorkflowError;
use crate::workflows::{WorkflowContext, WorkflowDispatcher, WorkflowOutcome};

pub const APOLOGY: &str = "Sorry, I couldn't generate a response right now. Please try again in a moment.";

impl WorkflowDispatcher {
    pub(super) async fn default_reply(
        &self,
        ctx: &WorkflowContext<'_>,
        target: &OutboundTarget,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let attempt = async {
            let reply = self
                .generator
                .generate_reply(ctx.window, Some(prompts::SIMPLE_RESPONSE))
                .await?;
            Ok::<usize, WorkflowError>(self.outbound.send_text(target, &reply).await?)
        };

        match attempt.await {
            Ok(sends) => Ok(WorkflowOutcome::Replied { sends }),
            Err(e) => {
                warn!(thread_id = %ctx.thread_id, error = %e, "Default reply failed, sending apology");
                if let Err(send_err) = self.outbound.send_text(target, APOLOGY).await {
                    error!(thread_id = %ctx.thread_id, error = %send_err, "Apology could not be sent");
                    return Err(send_err.into());
                }
                Ok(WorkflowOutcome::Apologized)
            }
        }
    }
}
