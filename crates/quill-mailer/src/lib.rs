pub mod http;

pub use http::HttpMailer;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// The external notification collaborator: delivers a one-time password to an
/// email address. Everything past this trait (provider, transport, retries)
/// is outside the auth service's contract.
#[async_trait]
pub trait OtpMailer: Send + Sync {
    async fn send_otp(&self, to: &str, code: &str) -> Result<()>;
}

pub const OTP_SUBJECT: &str = "Your One-Time Password (OTP) for Email Verification";

pub fn otp_email_body(code: &str) -> String {
    format!(
        "<p>Hello,</p>\
         <p>Your One-Time Password (OTP) for email verification is:</p>\
         <h2>{code}</h2>\
         <p>This OTP is valid for 10 minutes. Please do not share it with anyone.</p>\
         <p>If you did not request this, you can safely ignore this email.</p>"
    )
}

/// Dev/test mailer: logs the code instead of dispatching it. The server falls
/// back to this when no mail API is configured.
pub struct LogMailer;

#[async_trait]
impl OtpMailer for LogMailer {
    async fn send_otp(&self, to: &str, code: &str) -> Result<()> {
        info!("OTP for {}: {}", to, code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_the_code() {
        let body = otp_email_body("042137");
        assert!(body.contains("<h2>042137</h2>"));
        assert!(body.contains("valid for 10 minutes"));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        LogMailer.send_otp("ada@example.com", "123456").await.unwrap();
    }
}
