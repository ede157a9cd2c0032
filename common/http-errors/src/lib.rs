use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// One invalid field in a rejected request payload.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub details: Option<Vec<FieldError>>,
}

/// Typed failure surface shared by every handler. Each variant carries a
/// stable machine-readable `code`; the transport mapping (status, body,
/// `X-Error-Code` header) lives here so handlers only pick the kind.
#[derive(Debug)]
pub enum ApiError {
    Validation { errors: Vec<FieldError>, trace_id: Option<Uuid> },
    BadRequest { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    NotFound { code: &'static str, trace_id: Option<Uuid> },
    Conflict { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    RateLimited { retry_after_secs: u64, trace_id: Option<Uuid> },
    Internal { trace_id: Option<Uuid> },
}

impl ApiError {
    /// Log the source error and return a redacted 500; backend detail never
    /// reaches the response body.
    pub fn internal<E: std::fmt::Display>(e: E, trace_id: Option<Uuid>) -> Self {
        tracing::error!(error = %e, ?trace_id, "internal error");
        Self::Internal { trace_id }
    }

    pub fn bad_request(code: &'static str, trace_id: Option<Uuid>) -> Self {
        Self::BadRequest { code, trace_id, message: None }
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::Validation { errors, trace_id: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after: Option<u64> = None;
        let (status, body, error_code) = match self {
            ApiError::Validation { errors, trace_id } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "validation_failed".into(),
                    trace_id,
                    message: Some("Validation failed".into()),
                    details: Some(errors),
                },
                "validation_failed",
            ),
            ApiError::BadRequest { code, trace_id, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody { code: code.into(), trace_id, message, details: None },
                code,
            ),
            ApiError::NotFound { code, trace_id } => (
                StatusCode::NOT_FOUND,
                ErrorBody { code: code.into(), trace_id, message: None, details: None },
                code,
            ),
            ApiError::Conflict { code, trace_id, message } => (
                StatusCode::CONFLICT,
                ErrorBody { code: code.into(), trace_id, message, details: None },
                code,
            ),
            ApiError::RateLimited { retry_after_secs, trace_id } => {
                retry_after = Some(retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorBody {
                        code: "rate_limit_exceeded".into(),
                        trace_id,
                        message: Some("Too many requests".into()),
                        details: None,
                    },
                    "rate_limit_exceeded",
                )
            }
            ApiError::Internal { trace_id } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: "internal_error".into(),
                    trace_id,
                    message: Some("An unexpected error occurred".into()),
                    details: None,
                },
                "internal_error",
            ),
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        if let Some(secs) = retry_after {
            if let Ok(val) = HeaderValue::from_str(&secs.to_string()) {
                resp.headers_mut().insert(axum::http::header::RETRY_AFTER, val);
            }
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
