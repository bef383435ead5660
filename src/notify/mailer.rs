use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{config::SmtpConfig, error::NotificationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), NotificationError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotificationError> {
        let address = parse_address(&config.username)?;
        let from = Mailbox::new(config.from_name.clone(), address);
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|err| NotificationError::Transport(format!("starttls relay init failed: {err}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), NotificationError> {
        let to = Mailbox::new(None, parse_address(&email.to)?);
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .multipart(MultiPart::alternative_plain_html(email.text, email.html))
            .map_err(|err| NotificationError::Build(err.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|err| NotificationError::Transport(format!("send to {} failed: {err}", email.to)))?;
        Ok(())
    }
}

fn parse_address(raw: &str) -> Result<Address, NotificationError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|err| NotificationError::InvalidAddress {
            address: raw.to_string(),
            reason: err.to_string(),
        })
}
