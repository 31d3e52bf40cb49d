// Verification email delivery
// Delivery itself is out of scope; the default mailer logs the link.

use anyhow::Result;
use tracing::info;

pub trait Mailer: Send + Sync {
    fn send_verification(&self, email: &str, token: &str) -> Result<()>;
}

/// Link the user follows to confirm their address
pub fn verification_link(frontend_url: &str, token: &str) -> String {
    format!(
        "{}/verify?token={}",
        frontend_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

/// Writes the verification link to the log instead of sending mail
pub struct LogMailer {
    frontend_url: String,
}

impl LogMailer {
    pub fn new(frontend_url: &str) -> Self {
        LogMailer {
            frontend_url: frontend_url.to_string(),
        }
    }
}

impl Mailer for LogMailer {
    fn send_verification(&self, email: &str, token: &str) -> Result<()> {
        let link = verification_link(&self.frontend_url, token);
        info!(%email, %link, "verification email");
        Ok(())
    }
}
