use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sesv2::{
    Client,
    config::{Credentials, Region},
    types::{Body, Content, Destination, EmailContent, Message},
};
use tracing::{debug, error};

use crate::email::{EmailError, EmailMessage, EmailProvider, SesConfig};

fn utf8(data: &str) -> Result<Content, EmailError> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| EmailError::ProviderError(e.to_string()))
}

pub struct SesProvider {
    client: Client,
}

impl SesProvider {
    pub async fn new(config: &SesConfig) -> Result<Self, EmailError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        // Without static keys the default provider chain applies
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "picainn-ses",
            ));
        }

        let client = Client::new(&loader.load().await);
        debug!(region = ?config.region, "SES client ready");
        Ok(Self { client })
    }
}

#[async_trait]
impl EmailProvider for SesProvider {
    async fn send_email(&self, message: EmailMessage) -> Result<(), EmailError> {
        message.check_addresses()?;
        debug!(to = ?message.to, "Sending email via SES");

        let destination = Destination::builder()
            .set_to_addresses(Some(message.to.clone()))
            .build();

        let mut body = Body::builder().text(utf8(&message.body.text)?);
        if let Some(html) = &message.body.html {
            body = body.html(utf8(html)?);
        }
        let body = body.build();

        let subject = utf8(&message.subject)?;

        let email_message = Message::builder().subject(subject).body(body).build();

        let content = EmailContent::builder().simple(email_message).build();

        let mut send_email_builder = self
            .client
            .send_email()
            .from_email_address(&message.from)
            .destination(destination)
            .content(content);

        if let Some(reply_to) = &message.reply_to {
            send_email_builder = send_email_builder.reply_to_addresses(reply_to);
        }

        match send_email_builder.send().await {
            Ok(output) => {
                debug!(message_id = ?output.message_id(), "Email sent via SES");
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email via SES: {}", e);
                Err(EmailError::AwsError(e.to_string()))
            }
        }
    }

    fn name(&self) -> &str {
        "Amazon SES"
    }
}
