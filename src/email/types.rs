use serde::{Deserialize, Serialize};

use super::EmailError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
    pub body: EmailBody,
    pub reply_to: Option<String>,
}

/// Inquiry mails always carry both parts; plain text is the fallback for
/// clients that do not render HTML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailBody {
    pub text: String,
    pub html: Option<String>,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, from: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            from: from.into(),
            subject: subject.into(),
            body: EmailBody {
                text: String::new(),
                html: None,
            },
            reply_to: None,
        }
    }

    pub fn with_both(mut self, text: impl Into<String>, html: impl Into<String>) -> Self {
        self.body = EmailBody {
            text: text.into(),
            html: Some(html.into()),
        };
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Rejects messages whose recipient or reply-to address is obviously
    /// malformed before a provider is asked to deliver them.
    pub fn check_addresses(&self) -> Result<(), EmailError> {
        if self.to.is_empty() {
            return Err(EmailError::InvalidEmail("no recipients".to_string()));
        }
        for address in self.to.iter().chain(self.reply_to.iter()) {
            if !is_plausible_address(address) {
                return Err(EmailError::InvalidEmail(address.clone()));
            }
        }
        Ok(())
    }
}

fn is_plausible_address(address: &str) -> bool {
    match address.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !address.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_addresses() {
        let message = EmailMessage::new("desk@picainn.jp", "noreply@picainn.jp", "Inquiry");
        assert!(message.check_addresses().is_ok());

        let bad_reply = message.clone().with_reply_to("not an address");
        assert!(matches!(
            bad_reply.check_addresses(),
            Err(EmailError::InvalidEmail(address)) if address == "not an address"
        ));

        let bad_domain = EmailMessage::new("desk@localhost", "noreply@picainn.jp", "Inquiry");
        assert!(bad_domain.check_addresses().is_err());
    }
}
