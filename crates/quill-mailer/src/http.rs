use anyhow::{Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use tracing::error;

use crate::{OTP_SUBJECT, OtpMailer, otp_email_body};

/// Sends OTP mail through an HTTP mail API (any provider with a
/// "POST a JSON message, bearer key" surface).
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: String, from: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl OtpMailer for HttpMailer {
    async fn send_otp(&self, to: &str, code: &str) -> Result<()> {
        let payload = serde_json::json!({
            "from": self.from,
            "to": to,
            "subject": OTP_SUBJECT,
            "html": otp_email_body(code),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Mail API error ({}): {}", status, body);
            bail!("Mail API returned {}", status);
        }

        Ok(())
    }
}
