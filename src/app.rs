//! Composition root: wires config and collaborators into the HTTP state.

use std::sync::Arc;

use tracing::info;

use crate::agent::{AgentProfile, ResponseGenerator};
use crate::channels::webhook::AppState;
use crate::channels::{A1BaseClient, EmailTransport, MessagingGateway, OutboundDispatcher, SmtpMailer};
use crate::config::AppConfig;
use crate::error::{ConfigError, Error};
use crate::llm::{LlmProvider, create_provider};
use crate::pipeline::{IntentTriage, Normalizer, Pipeline};
use crate::store::{ApprovalStore, DurableHandle, FallbackStore, ThreadStore, UserRegistry};
use crate::workflows::{WorkflowDispatcher, WorkflowSettings};

/// External collaborators the pipeline talks to.
pub struct Collaborators {
    pub llm: Arc<dyn LlmProvider>,
    pub gateway: Arc<dyn MessagingGateway>,
    pub email: Arc<dyn EmailTransport>,
    pub durable: Arc<DurableHandle>,
}

impl Collaborators {
    /// Real clients: rig-backed LLM, A1Base gateway, SMTP when configured
    /// (A1Base email otherwise), and a lazily opened libSQL store.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let llm = create_provider(&config.llm)?;
        let a1base = Arc::new(A1BaseClient::new(config.gateway.clone())?);
        let email: Arc<dyn EmailTransport> = match &config.smtp {
            Some(smtp) => {
                info!(host = %smtp.host, "Email via SMTP");
                Arc::new(SmtpMailer::new(smtp.clone()))
            }
            None => a1base.clone(),
        };
        Ok(Self {
            llm,
            gateway: a1base,
            email,
            durable: Arc::new(DurableHandle::from_config(config.store.clone())),
        })
    }
}

/// The configured profile file, or the built-in profile.
pub fn load_profile(config: &AppConfig) -> Result<AgentProfile, ConfigError> {
    let profile = match &config.profile_path {
        Some(path) => AgentProfile::load(path)?,
        None => AgentProfile::default(),
    };
    Ok(profile.with_default_name(&config.agent.name))
}

/// Assemble stores, triage, workflows and the pipeline behind one [`AppState`].
pub fn build_state(config: &AppConfig, profile: AgentProfile, collaborators: Collaborators) -> AppState {
    let Collaborators {
        llm,
        gateway,
        email,
        durable,
    } = collaborators;
    let agent_number = config.agent.number.clone();

    let fallback = Arc::new(FallbackStore::new(agent_number.clone()));
    let threads = Arc::new(ThreadStore::new(
        durable.clone(),
        fallback.clone(),
        config.pipeline.fallback,
        config.pipeline.window_size,
        agent_number.clone(),
    ));
    let users = Arc::new(UserRegistry::new(durable.clone()));
    let approvals = Arc::new(ApprovalStore::new(durable, fallback));

    let outbound = Arc::new(OutboundDispatcher::new(
        gateway,
        email,
        agent_number.clone().unwrap_or_default(),
        config.gateway.service.clone(),
        config.agent.email.clone(),
        config.pipeline.split_paragraphs,
    ));
    let generator = Arc::new(ResponseGenerator::new(llm.clone(), profile, agent_number.clone()));
    let workflows = Arc::new(WorkflowDispatcher::new(
        generator,
        outbound,
        approvals.clone(),
        WorkflowSettings::from(&config.pipeline),
    ));

    let pipeline = Arc::new(Pipeline::new(
        Normalizer::new(config.agent.clone()),
        threads,
        users,
        IntentTriage::new(llm, agent_number),
        workflows,
    ));

    AppState {
        pipeline,
        approvals,
        cron_secret: config.server.cron_secret.clone(),
    }
}
