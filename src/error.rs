use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Missing or invalid session")]
    Unauthorized,

    // never says whether the project exists
    #[error("Project not found or access denied")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{used}/{limit} edits used this month")]
    QuotaExceeded { used: u32, limit: u32 },

    #[error("Rate limit exceeded, retry after {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Domain verification failed: {0}")]
    VerificationFailed(String),

    #[error("{service} request failed: {detail}")]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Render error: {0}")]
    Render(#[from] serde_json::Error),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::QuotaExceeded { .. } => "quota_exceeded",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::VerificationFailed(_) => "verification_failed",
            AppError::Upstream { .. } => "upstream_error",
            AppError::Store(_) | AppError::Render(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::VerificationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> Value {
        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        match self {
            AppError::Validation { field, .. } => {
                body["field"] = json!(field);
            }
            AppError::QuotaExceeded { used, limit } => {
                body["used"] = json!(used);
                body["limit"] = json!(limit);
            }
            AppError::RateLimited { reset_at } => {
                body["resetAt"] = json!(reset_at);
            }
            AppError::Upstream { status, .. } => {
                body["upstreamStatus"] = json!(status);
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{self}");
        } else {
            tracing::debug!(kind = self.kind(), "{self}");
        }

        let mut response = (status, Json(self.body())).into_response();

        if let AppError::RateLimited { reset_at } = &self {
            let wait = (*reset_at - Utc::now()).num_seconds().max(1);
            if let Ok(value) = HeaderValue::from_str(&wait.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}
