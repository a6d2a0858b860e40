//! SMTP email transport via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use crate::channels::{EmailMessage, EmailTransport};
use crate::config::SmtpConfig;
use crate::error::GatewayError;

pub struct SmtpMailer {
    config: SmtpConfig,
}

fn send_failed(reason: String) -> GatewayError {
    GatewayError::SendFailed {
        operation: "send_email".into(),
        reason,
    }
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Build the MIME message. HTML bodies are sent as `text/html`.
    fn build_message(email: &EmailMessage) -> Result<Message, GatewayError> {
        let mut builder = Message::builder()
            .from(
                email
                    .sender_address
                    .parse()
                    .map_err(|e| send_failed(format!("Invalid from address: {e}")))?,
            )
            .to(email
                .recipient_address
                .parse()
                .map_err(|e| send_failed(format!("Invalid to address: {e}")))?)
            .subject(email.subject.as_str());

        if let Some(reply_to) = email.headers.get("reply_to") {
            builder = builder.reply_to(
                reply_to
                    .parse()
                    .map_err(|e| send_failed(format!("Invalid reply-to address: {e}")))?,
            );
        }

        let content_type = if looks_like_html(&email.body) {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        builder
            .header(content_type)
            .body(email.body.clone())
            .map_err(|e| send_failed(format!("Failed to build email: {e}")))
    }
}

fn looks_like_html(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with('<') && trimmed.contains("</")
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), GatewayError> {
        let message = Self::build_message(email)?;
        let config = self.config.clone();
        let recipient = email.recipient_address.clone();

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || {
            let creds = Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            );
            let transport = SmtpTransport::relay(&config.host)
                .map_err(|e| send_failed(format!("SMTP relay error: {e}")))?
                .port(config.port)
                .credentials(creds)
                .build();
            transport
                .send(&message)
                .map_err(|e| send_failed(format!("SMTP send failed: {e}")))?;
            Ok::<(), GatewayError>(())
        })
        .await
        .map_err(|e| send_failed(format!("SMTP task panicked: {e}")))??;

        info!(recipient = %recipient, "Email sent via SMTP");
        Ok(())
    }
}
