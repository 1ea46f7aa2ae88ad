//! Delivery Notifier: emails the revised resume to the customer as an
//! attachment over SMTP.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

use crate::config::SmtpConfig;

const SUBJECT: &str = "Your revised resume is ready";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

/// A revised document addressed to one customer.
#[derive(Debug, Clone)]
pub struct RevisionEmail {
    pub to: String,
    pub name: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_revision(&self, email: &RevisionEmail) -> Result<(), DeliveryError>;
}

fn body_text(name: &str) -> String {
    let first = name.split_whitespace().next().unwrap_or("there");
    format!(
        "Hi {first},\n\n\
         Your professionally revised resume is attached.\n\n\
         Reply to this email if anything needs another look.\n\n\
         The Resume Shortlist team\n"
    )
}

pub fn build_message(from: &str, email: &RevisionEmail) -> Result<Message, DeliveryError> {
    let to = Mailbox::new(Some(email.name.clone()), email.to.parse::<Address>()?);
    let content_type = ContentType::parse(&email.content_type)
        .or_else(|_| ContentType::parse("application/octet-stream"))
        .map_err(|e| DeliveryError::Build(e.to_string()))?;

    Message::builder()
        .from(from.parse::<Mailbox>()?)
        .to(to)
        .subject(SUBJECT)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body_text(&email.name)))
                .singlepart(
                    Attachment::new(email.filename.clone())
                        .body(email.bytes.to_vec(), content_type),
                ),
        )
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

pub struct SmtpNotifier {
    config: SmtpConfig,
    timeout: Duration,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_revision(&self, email: &RevisionEmail) -> Result<(), DeliveryError> {
        let message = build_message(&self.config.from_address, email)?;

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)?
            .port(self.config.port)
            .timeout(Some(self.timeout));
        if let (Some(user), Some(pass)) = (&self.config.user, &self.config.password) {
            transport = transport.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        transport.build().send(message).await?;
        info!(to = %email.to, file = %email.filename, "Revision email sent");
        Ok(())
    }
}
