//! Error types for chat-triage.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Messaging gateway errors (individual/group sends and email).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Cannot send to {thread_type} thread: missing {missing}")]
    InvalidTarget {
        thread_type: String,
        missing: &'static str,
    },

    #[error("Gateway {operation} failed: {reason}")]
    SendFailed { operation: String, reason: String },

    #[error("Gateway {operation} rejected with status {status}: {body}")]
    Rejected {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Email transport not configured")]
    EmailNotConfigured,
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by workflow executors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Outbound send failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Email generation returned no content")]
    EmptyEmailContent,
}

/// Pipeline-related errors surfaced at the ingestion boundary.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Workflow failed: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
