use crate::email::{EmailError, EmailMessage, EmailProvider};
use async_trait::async_trait;
use tracing::{debug, info};

/// Logs messages instead of delivering them. Used in development when no
/// mail service is configured.
#[derive(Default)]
pub struct NullProvider;

impl NullProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailProvider for NullProvider {
    async fn send_email(&self, message: EmailMessage) -> Result<(), EmailError> {
        message.check_addresses()?;

        info!(
            to = %message.to.join(", "),
            reply_to = message.reply_to.as_deref().unwrap_or("(none)"),
            subject = %message.subject,
            "Email not sent (null provider)"
        );
        debug!(from = %message.from, "Email body:\n{}", message.body.text);
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}
