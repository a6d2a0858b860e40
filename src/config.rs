//! Configuration types, built from environment variables.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default number of messages kept per thread.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Default identity-reference link sent after an agent introduction.
pub const DEFAULT_IDENTITY_URL: &str =
    "https://www.a1base.com/identity-and-trust/cd70954a-ab48-4d4d-af90-4d6ab5084bef";

/// The agent's own identity on the messaging channel.
#[derive(Debug, Clone, Default)]
pub struct AgentIdentity {
    /// Agent phone number as configured (may carry a leading `+`).
    pub number: Option<String>,
    /// Display name substituted for messages sent from the agent number.
    pub name: String,
    /// Sender address used for outbound email.
    pub email: Option<String>,
}

/// Messaging gateway credentials and endpoint.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub api_secret: SecretString,
    pub account_id: String,
    /// Delivery service name passed on every send (e.g. "whatsapp").
    pub service: String,
}

/// Durable store connection parameters. Absent means "not configured".
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Remote { url: String, token: SecretString },
    Local { path: PathBuf },
}

/// What the thread store does when the durable store cannot take a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Write to the in-process fallback map.
    #[default]
    InMemory,
    /// Report the write as failed; the pipeline still proceeds.
    Disabled,
}

/// Behavior switches for the ingestion and workflow pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub window_size: usize,
    /// Split text replies on newlines into separate outbound messages.
    pub split_paragraphs: bool,
    pub fallback: FallbackPolicy,
    /// Hold drafted emails until the user confirms them.
    pub require_email_approval: bool,
    pub approval_expire_minutes: u32,
    pub identity_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            split_paragraphs: false,
            fallback: FallbackPolicy::InMemory,
            require_email_approval: false,
            approval_expire_minutes: 30,
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
        }
    }
}

/// Optional SMTP transport for outbound email.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Bearer secret for the maintenance endpoint. `None` disables it.
    pub cron_secret: Option<SecretString>,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub agent: AgentIdentity,
    pub gateway: GatewayConfig,
    pub store: Option<StoreConfig>,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub smtp: Option<SmtpConfig>,
    pub server: ServerConfig,
    /// JSON agent profile; the built-in profile is used when unset.
    pub profile_path: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let agent = AgentIdentity {
            number: get("A1BASE_AGENT_NUMBER"),
            name: get("A1BASE_AGENT_NAME").unwrap_or_else(|| "Assistant".to_string()),
            email: get("A1BASE_AGENT_EMAIL"),
        };

        let gateway = GatewayConfig {
            api_url: get("A1BASE_API_URL")
                .unwrap_or_else(|| "https://api.a1base.com/v1".to_string()),
            api_key: SecretString::from(require("A1BASE_API_KEY")?),
            api_secret: SecretString::from(require("A1BASE_API_SECRET")?),
            account_id: require("A1BASE_ACCOUNT_ID")?,
            service: get("A1BASE_SERVICE").unwrap_or_else(|| "whatsapp".to_string()),
        };

        let store = match (get("TRIAGE_DB_URL"), get("TRIAGE_DB_PATH")) {
            (Some(url), _) => Some(StoreConfig::Remote {
                url,
                token: SecretString::from(get("TRIAGE_DB_TOKEN").unwrap_or_default()),
            }),
            (None, Some(path)) => Some(StoreConfig::Local {
                path: PathBuf::from(path),
            }),
            (None, None) => None,
        };

        let backend = match get("TRIAGE_LLM_BACKEND").as_deref() {
            None | Some("openai") => LlmBackend::OpenAi,
            Some("anthropic") => LlmBackend::Anthropic,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "TRIAGE_LLM_BACKEND".into(),
                    message: format!("unknown backend '{other}' (expected openai or anthropic)"),
                });
            }
        };
        let (key_var, default_model) = match backend {
            LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-4o"),
            LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
        };
        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(require(key_var)?),
            model: get("TRIAGE_MODEL").unwrap_or_else(|| default_model.to_string()),
        };

        let defaults = PipelineConfig::default();
        let fallback = match get("TRIAGE_FALLBACK").as_deref() {
            None | Some("memory") => FallbackPolicy::InMemory,
            Some("off") => FallbackPolicy::Disabled,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "TRIAGE_FALLBACK".into(),
                    message: format!("unknown policy '{other}' (expected memory or off)"),
                });
            }
        };
        let pipeline = PipelineConfig {
            window_size: parse_or(&get, "TRIAGE_WINDOW_SIZE", defaults.window_size)?,
            split_paragraphs: parse_bool(&get, "TRIAGE_SPLIT_PARAGRAPHS", false)?,
            fallback,
            require_email_approval: parse_bool(&get, "TRIAGE_REQUIRE_EMAIL_APPROVAL", false)?,
            approval_expire_minutes: parse_or(
                &get,
                "TRIAGE_APPROVAL_EXPIRE_MIN",
                defaults.approval_expire_minutes,
            )?,
            identity_url: get("TRIAGE_IDENTITY_URL").unwrap_or(defaults.identity_url),
        };
        if pipeline.window_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_WINDOW_SIZE".into(),
                message: "must be at least 1".into(),
            });
        }

        let smtp = match get("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(&get, "SMTP_PORT", 587)?,
                username: get("SMTP_USERNAME").unwrap_or_default(),
                password: SecretString::from(get("SMTP_PASSWORD").unwrap_or_default()),
            }),
            None => None,
        };

        let server = ServerConfig {
            port: parse_or(&get, "TRIAGE_PORT", 3000)?,
            cron_secret: get("CRON_SECRET").map(SecretString::from),
        };

        Ok(Self {
            agent,
            gateway,
            store,
            llm,
            pipeline,
            smtp,
            server,
            profile_path: get("TRIAGE_PROFILE_PATH").map(PathBuf::from),
        })
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool<F>(get: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
