//! Outbound delivery through the SendGrid v3 mail send API.
//!
//! Transport and retry semantics belong to SendGrid; this client shapes one request, reports one
//! result. Click and open tracking are disabled on every message so the provider does not rewrite
//! the inlined markup.

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

const SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Error)]
pub enum SendError {
    #[error("SendGrid request failed: {0}")]
    Transport(
        #[source]
        #[from]
        reqwest::Error,
    ),
    #[error("SendGrid rejected the message: {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

#[derive(Debug, Serialize)]
struct MailSend<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    tracking_settings: TrackingSettings,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct TrackingSettings {
    click_tracking: TrackingToggle,
    open_tracking: TrackingToggle,
}

#[derive(Debug, Serialize)]
struct TrackingToggle {
    enable: bool,
}

/// Client for the SendGrid v3 mail send API.
#[derive(Clone)]
pub struct Mailer {
    http: reqwest::Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl Mailer {
    pub fn new(api_key: String, from_email: String, from_name: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            from_email,
            from_name,
        }
    }

    /// Dispatch one HTML message. A non-2xx response from SendGrid is surfaced as
    /// [SendError::Rejected] with the provider's response body.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), SendError> {
        let response = self
            .http
            .post(SEND_URL)
            .bearer_auth(&self.api_key)
            .json(&self.payload(to, subject, html))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected { status, body });
        }
        info!(%to, %subject, "email dispatched");
        Ok(())
    }

    fn payload<'a>(&'a self, to: &'a str, subject: &'a str, html: &'a str) -> MailSend<'a> {
        MailSend {
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: to,
                    name: None,
                }],
            }],
            from: Address {
                email: &self.from_email,
                name: Some(&self.from_name),
            },
            subject,
            content: vec![Content {
                content_type: "text/html",
                value: html,
            }],
            tracking_settings: TrackingSettings {
                click_tracking: TrackingToggle { enable: false },
                open_tracking: TrackingToggle { enable: false },
            },
        }
    }
}
