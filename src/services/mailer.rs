//! Outbound mail hand-off. Delivery is owned by an external collaborator;
//! the default implementation only records that a message was due.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, email: &str, username: &str, token: &str) -> Result<()>;

    async fn send_password_reset(&self, email: &str, username: &str, token: &str) -> Result<()>;
}

/// Logs each hand-off. The token itself is never written to the log.
pub struct LogMailer {
    base_url: String,
}

impl LogMailer {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn link(&self, path: &str) -> String {
        format!("{}/{path}?token=<redacted>", self.base_url)
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, email: &str, username: &str, _token: &str) -> Result<()> {
        info!(
            event = "mail_handoff",
            kind = "verification",
            to = %email,
            username = %username,
            link = %self.link("verify"),
            "Verification email queued"
        );
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, username: &str, _token: &str) -> Result<()> {
        info!(
            event = "mail_handoff",
            kind = "password_reset",
            to = %email,
            username = %username,
            link = %self.link("reset-password"),
            "Password reset email queued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_hides_token() {
        let mailer = LogMailer::new("https://files.example.com/");
        assert_eq!(
            mailer.link("verify"),
            "https://files.example.com/verify?token=<redacted>"
        );
    }
}
