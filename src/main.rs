use anyhow::Context;

use chat_triage::app::{self, Collaborators};
use chat_triage::channels::webhook::webhook_routes;
use chat_triage::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let profile = app::load_profile(&config).context("Failed to load agent profile")?;

    eprintln!("chat-triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Agent: {} ({})", profile.name, config.agent.number.as_deref().unwrap_or("no number"));
    eprintln!(
        "   Durable store: {}",
        if config.store.is_some() { "configured" } else { "in-memory only" }
    );
    eprintln!("   Webhook: http://0.0.0.0:{}/whatsapp/incoming", config.server.port);

    let collaborators = Collaborators::from_config(&config)?;
    let state = app::build_state(&config, profile, collaborators);
    let router = webhook_routes(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server.port))?;
    tracing::info!(port = config.server.port, "Webhook server started");
    axum::serve(listener, router).await?;

    Ok(())
}
