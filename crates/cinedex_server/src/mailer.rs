//! Notification transport.
//!
//! Handlers never send mail inline: they hand a closure to
//! [`BackgroundTasks`](crate::BackgroundTasks), which calls a [`Mailer`].
//! The server always wraps its transport in a [`RetryingMailer`], so the
//! bounded retry lives with the transport and not with request handling.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while sending a notification.
#[derive(Debug, Error)]
pub enum MailError {
    /// No template is registered under this key.
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    /// The template data lacks a placeholder value.
    #[error("template {template} needs field {field}")]
    MissingField {
        /// Template key.
        template: String,
        /// Missing placeholder.
        field: String,
    },

    /// The transport failed to deliver. Safe to retry.
    #[error("transport error: {0}")]
    Transport(String),
}

impl MailError {
    /// Returns true if sending again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MailError::Transport(_))
    }
}

/// Sends templated notifications.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Renders `template` with `data` and delivers it to `recipient`.
    async fn send(&self, recipient: &str, template: &str, data: &Value) -> Result<(), MailError>;
}

/// A rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

struct Template {
    key: &'static str,
    subject: &'static str,
    body: &'static str,
}

const TEMPLATES: &[Template] = &[Template {
    key: "user_welcome",
    subject: "Welcome to Cinedex!",
    body: "Hi,\n\
           \n\
           Thanks for signing up for a Cinedex account. We're excited to have you on board!\n\
           \n\
           For future reference, your user ID number is {{user_id}}.\n\
           \n\
           Please send a request to the `PUT /v1/users/activated` endpoint with the following \
           JSON body to activate your account:\n\
           \n\
           {\"token\": \"{{activation_token}}\"}\n\
           \n\
           Please note that this is a one-time use token and it will expire in 3 days.\n\
           \n\
           Thanks,\n\
           The Cinedex Team\n",
}];

/// Renders a registered template, substituting `{{field}}` placeholders
/// from the top-level keys of `data`.
pub fn render(template: &str, data: &Value) -> Result<Message, MailError> {
    let tpl = TEMPLATES
        .iter()
        .find(|t| t.key == template)
        .ok_or_else(|| MailError::UnknownTemplate(template.to_string()))?;

    Ok(Message {
        subject: substitute(tpl.key, tpl.subject, data)?,
        body: substitute(tpl.key, tpl.body, data)?,
    })
}

fn substitute(key: &str, text: &str, data: &Value) -> Result<String, MailError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let field = &after[..end];
        let value = data.get(field).ok_or_else(|| MailError::MissingField {
            template: key.to_string(),
            field: field.to_string(),
        })?;
        match value {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Fixed-delay retry policy for notification delivery.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Pause before every retry.
    pub delay: Duration,
}

impl RetryConfig {
    /// Retries up to `max_attempts` with a one second pause between tries.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::from_secs(1),
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Sets the pause between attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay before a given attempt (0-indexed). The first attempt is immediate.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.delay
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Retries transport failures of an inner [`Mailer`].
pub struct RetryingMailer {
    inner: Arc<dyn Mailer>,
    retry: RetryConfig,
}

impl RetryingMailer {
    /// Wraps `inner` with `retry`.
    pub fn new(inner: Arc<dyn Mailer>, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }
}

#[async_trait]
impl Mailer for RetryingMailer {
    async fn send(&self, recipient: &str, template: &str, data: &Value) -> Result<(), MailError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
            match self.inner.send(recipient, template, data).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    tracing::warn!(template, attempt = attempt + 1, error = %err, "notification failed, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Development transport that logs rendered messages instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, template: &str, data: &Value) -> Result<(), MailError> {
        let message = render(template, data)?;
        tracing::info!(recipient, subject = %message.subject, "notification sent");
        tracing::debug!(recipient, body = %message.body, "notification body");
        Ok(())
    }
}
