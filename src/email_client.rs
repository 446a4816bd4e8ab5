use std::sync::Mutex;

use futures::future::{ready, BoxFuture};
use serde::Serialize;

use crate::error::EmailError;
use crate::validators::is_valid_email;

/// Notification Sender used by registration and verification flows
pub trait Notifier: Send + Sync {
    fn send<'a>(
        &'a self,
        to: &'a str,
        subject: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<(), EmailError>>;
}

/// Sends mail through an HTTP email API
#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderEmail,
}

#[derive(Clone, Debug)]
pub struct SenderEmail(String);

impl SenderEmail {
    pub fn parse(s: String) -> Result<Self, EmailError> {
        let email = is_valid_email(&s).map_err(|e| EmailError::InvalidRecipient(e.to_string()))?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(rename = "Html")]
    html: &'a str,
    #[serde(rename = "Subject")]
    subject: &'a str,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderEmail, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
            sender,
        }
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), EmailError> {
        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: self.sender.inner(),
            to: recipient,
            subject,
            html: html_content,
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send email: {}", e);
                EmailError::SendFailed(e.to_string())
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Email service returned error: {}", e);
                EmailError::SendFailed(e.to_string())
            })?;

        Ok(())
    }
}

impl Notifier for EmailClient {
    fn send<'a>(
        &'a self,
        to: &'a str,
        subject: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<(), EmailError>> {
        Box::pin(self.send_email(to, subject, body))
    }
}

/// A message captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps messages in memory instead of delivering them
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(
        &'a self,
        to: &'a str,
        subject: &'a str,
        body: &'a str,
    ) -> BoxFuture<'a, Result<(), EmailError>> {
        let result = self
            .sent
            .lock()
            .map(|mut sent| {
                sent.push(SentEmail {
                    to: to.to_string(),
                    subject: subject.to_string(),
                    body: body.to_string(),
                })
            })
            .map_err(|_| EmailError::SendFailed("outbox lock poisoned".to_string()));
        Box::pin(ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_email_parse_valid_email() {
        let sender = SenderEmail::parse("test@example.com".to_string());
        assert!(sender.is_ok());
    }

    #[test]
    fn test_sender_email_parse_invalid_email() {
        let sender = SenderEmail::parse("invalid-email".to_string());
        assert!(sender.is_err());
    }

    #[tokio::test]
    async fn test_recording_notifier_keeps_messages() {
        let notifier = RecordingNotifier::new();
        notifier.send("a@b.com", "Hi", "<b>body</b>").await.unwrap();

        assert_eq!(
            notifier.sent(),
            vec![SentEmail {
                to: "a@b.com".to_string(),
                subject: "Hi".to_string(),
                body: "<b>body</b>".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_email_client_reports_unreachable_service() {
        let client = EmailClient::new(
            "http://127.0.0.1:9".to_string(),
            SenderEmail::parse("sender@example.com".to_string()).unwrap(),
            reqwest::Client::new(),
        );

        let result = client.send_email("a@b.com", "Hi", "body").await;
        assert!(matches!(result, Err(EmailError::SendFailed(_))));
    }
}
