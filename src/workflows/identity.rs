//! Identity verification: introduce the agent, then share the identity link.

use tracing::debug;

use crate::channels::OutboundTarget;
use crate::error::WorkflowError;
use crate::workflows::{WorkflowContext, WorkflowDispatcher, WorkflowOutcome};

impl WorkflowDispatcher {
    pub(super) async fn verify_identity(
        &self,
        ctx: &WorkflowContext<'_>,
        target: &OutboundTarget,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let introduction = self.generator.generate_introduction(ctx.window).await?;
        let mut sends = self.outbound.send_text(target, &introduction).await?;
        sends += self
            .outbound
            .send_text(target, &self.settings.identity_url)
            .await?;
        debug!(thread_id = %ctx.thread_id, sends, "Identity card sent");
        Ok(WorkflowOutcome::IdentitySent { sends })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::error::WorkflowError;
    use crate::pipeline::types::{Intent, ThreadType};
    use crate::workflows::test_support::{RecordingGateway, ScriptedLlm, dispatcher, message};
    use crate::workflows::{WorkflowContext, WorkflowOutcome};

    #[tokio::test]
    async fn sends_introduction_then_link() {
        let llm = Arc::new(ScriptedLlm::new(&["Hi Alice, I'm Assistant from A1Base."]));
        let gateway = Arc::new(RecordingGateway::default());
        let (workflows, _) = dispatcher(llm, gateway.clone(), false);

        let msg = message("m1", "+1666", "Alice", "who are you?");
        let window = vec![msg.clone()];
        let outcome = workflows
            .dispatch(
                Intent::IdentityRequest,
                WorkflowContext {
                    thread_id: "t1",
                    thread_type: ThreadType::Individual,
                    sender_number: "+1666",
                    message: &msg,
                    window: &window,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome, WorkflowOutcome::IdentitySent { sends: 2 });
        let texts = gateway.texts.lock().unwrap();
        assert_eq!(texts[0], "Hi Alice, I'm Assistant from A1Base.");
        assert_eq!(texts[1], "https://example.com/identity");
    }

    #[tokio::test]
    async fn generation_failure_is_fatal() {
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let gateway = Arc::new(RecordingGateway::default());
        let (workflows, _) = dispatcher(llm, gateway.clone(), false);

        let msg = message("m1", "+1666", "Alice", "who are you?");
        let window = vec![msg.clone()];
        let result = workflows
            .dispatch(
                Intent::IdentityRequest,
                WorkflowContext {
                    thread_id: "t1",
                    thread_type: ThreadType::Individual,
                    sender_number: "+1666",
                    message: &msg,
                    window: &window,
                },
            )
            .await;

        assert!(matches!(result, Err(WorkflowError::Generation(_))));
        assert!(gateway.texts.lock().unwrap().is_empty());
    }
}
