use crate::inline::{self, InlineError};
use crate::mailer::{Mailer, SendError};
use actix_web::http::StatusCode;
use actix_web::{get, post, web, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

/// Shared application state.
pub struct AppState {
    /// Configured mail client; absent when SendGrid credentials are not set, in which case the
    /// preview route still works and the send route reports the misconfiguration.
    pub mailer: Option<Mailer>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing required field: htmlContent")]
    MissingHtml,
    #[error("Missing required fields: to, subject, or htmlContent")]
    MissingSendFields,
    #[error("Failed to process HTML")]
    Inline(#[source] InlineError),
    #[error("SendGrid is not configured. Please set SENDGRID_API_KEY and SENDGRID_FROM_EMAIL")]
    MailerNotConfigured,
    #[error("Failed to send email")]
    Send(#[source] SendError),
}

impl ApiError {
    fn details(&self) -> Option<String> {
        match self {
            ApiError::Inline(e) => Some(e.to_string()),
            ApiError::Send(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingHtml | ApiError::MissingSendFields => StatusCode::BAD_REQUEST,
            ApiError::Inline(_) | ApiError::MailerNotConfigured | ApiError::Send(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({ "error": self.to_string() });
        if let Some(details) = self.details() {
            body["details"] = json!(details);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(default)]
    pub html_content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub success: bool,
    pub inlined_html: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub html_content: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[get("/health")]
pub async fn health() -> web::Json<HealthResponse> {
    web::Json(HealthResponse {
        status: "healthy",
        service: "email-inliner",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Inline the submitted markup and return it without sending anything.
#[post("/api/preview-html")]
pub async fn preview_html(
    request: web::Json<PreviewRequest>,
) -> Result<web::Json<PreviewResponse>, ApiError> {
    if request.html_content.is_empty() {
        return Err(ApiError::MissingHtml);
    }
    let inlined_html = inline::inline_styles(&request.html_content).map_err(ApiError::Inline)?;
    Ok(web::Json(PreviewResponse {
        success: true,
        inlined_html,
    }))
}

/// Inline the submitted markup and dispatch it through SendGrid.
///
/// Registered behind the rate limit guard; by the time this runs the request has been admitted.
pub async fn send_email(
    state: web::Data<AppState>,
    request: web::Json<SendRequest>,
) -> Result<web::Json<SendResponse>, ApiError> {
    let SendRequest {
        to,
        subject,
        html_content,
    } = request.into_inner();
    if to.is_empty() || subject.is_empty() || html_content.is_empty() {
        return Err(ApiError::MissingSendFields);
    }
    let mailer = state.mailer.as_ref().ok_or(ApiError::MailerNotConfigured)?;

    info!(%to, %subject, "email request received");
    let inlined = inline::inline_styles(&html_content).map_err(ApiError::Inline)?;
    mailer.send(&to, &subject, &inlined).await.map_err(|e| {
        error!(error = %e, "failed to send email");
        ApiError::Send(e)
    })?;
    Ok(web::Json(SendResponse {
        success: true,
        message: "Email sent successfully",
    }))
}
