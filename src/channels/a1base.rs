//! HTTP client for the A1Base messaging API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{debug, warn};

use crate::channels::{EmailMessage, EmailTransport, GroupMessage, IndividualMessage, MessagingGateway};
use crate::config::GatewayConfig;
use crate::error::GatewayError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct A1BaseClient {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl A1BaseClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::SendFailed {
                operation: "client_init".into(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// `{api_url}/{resource}/{account_id}/send`
    fn send_url(&self, resource: &str) -> String {
        format!(
            "{}/{}/{}/send",
            self.config.api_url.trim_end_matches('/'),
            resource,
            self.config.account_id
        )
    }

    async fn post<T: Serialize + Sync + ?Sized>(
        &self,
        operation: &str,
        resource: &str,
        body: &T,
    ) -> Result<(), GatewayError> {
        let resp = self
            .client
            .post(self.send_url(resource))
            .header("X-API-Key", self.config.api_key.expose_secret())
            .header("X-API-Secret", self.config.api_secret.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::SendFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            debug!(operation, status = status.as_u16(), "Gateway call succeeded");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        warn!(operation, status = status.as_u16(), "Gateway rejected request");
        Err(GatewayError::Rejected {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl MessagingGateway for A1BaseClient {
    async fn send_individual(&self, message: &IndividualMessage) -> Result<(), GatewayError> {
        self.post("send_individual", "messages/individual", message)
            .await
    }

    async fn send_group(&self, message: &GroupMessage) -> Result<(), GatewayError> {
        self.post("send_group", "messages/group", message).await
    }
}

#[async_trait]
impl EmailTransport for A1BaseClient {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), GatewayError> {
        self.post("send_email", "emails", email).await
    }
}
