/// Unified error types for the IPAM admin service
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Field-level validation messages, keyed by input field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a single-field error set
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Turn a non-empty set into an error
    pub fn into_result(self) -> IpamResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(IpamError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl From<validator::ValidationErrors> for FieldErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            for err in errs.iter() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("The {} field is invalid ({}).", field, err.code));
                fields.add(&field.to_string(), message);
            }
        }
        fields
    }
}

/// Main error type for the service
#[derive(Error, Debug)]
pub enum IpamError {
    /// No valid actor context for the request
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Credentials did not match; never says which part was wrong
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Authenticated but not cleared for the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed input with per-field detail
    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate unique value (email, live IP, permission name)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Persistence failure
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IpamError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        IpamError::Validation(FieldErrors::single(field, message))
    }

    /// Short machine-readable code, also used as a metrics label
    pub fn code(&self) -> &'static str {
        match self {
            IpamError::Unauthenticated => "Unauthenticated",
            IpamError::InvalidCredentials => "InvalidCredentials",
            IpamError::Forbidden(_) => "Forbidden",
            IpamError::Validation(_) => "ValidationError",
            IpamError::NotFound(_) => "NotFound",
            IpamError::Conflict(_) => "Conflict",
            IpamError::StorageUnavailable(_) => "StorageUnavailable",
            IpamError::Internal(_) => "InternalServerError",
        }
    }
}

impl From<validator::ValidationErrors> for IpamError {
    fn from(errors: validator::ValidationErrors) -> Self {
        IpamError::Validation(errors.into())
    }
}

impl From<JsonRejection> for IpamError {
    fn from(rejection: JsonRejection) -> Self {
        let fields = match &rejection {
            JsonRejection::JsonDataError(_) => decode_fields(&rejection.body_text(), "body"),
            JsonRejection::MissingJsonContentType(_) => {
                FieldErrors::single("body", "The request body must be sent as JSON.")
            }
            _ => FieldErrors::single("body", "The request body is not valid JSON."),
        };
        IpamError::Validation(fields)
    }
}

impl From<QueryRejection> for IpamError {
    fn from(rejection: QueryRejection) -> Self {
        IpamError::Validation(decode_fields(&rejection.body_text(), "query"))
    }
}

/// Field errors from a deserialization rejection
///
/// Rejection text reads `<context>: [<field path>: ]<serde message>`.
fn decode_fields(text: &str, fallback: &str) -> FieldErrors {
    let detail = text.split_once(": ").map(|(_, rest)| rest).unwrap_or(text);
    let (path, detail) = match detail.split_once(": ") {
        Some((head, rest)) if is_field_path(head) => (Some(head), rest),
        _ => (None, detail),
    };

    if let Some(missing) = detail
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
    {
        let field = match path {
            Some(path) => format!("{}.{}", path, missing),
            None => missing.to_string(),
        };
        return FieldErrors::single(
            &field,
            format!("The {} field is required.", missing.replace('_', " ")),
        );
    }

    match path {
        Some(field) => FieldErrors::single(
            field,
            format!("The selected {} is invalid.", field.replace('_', " ")),
        ),
        None => FieldErrors::single(fallback, "The given data could not be read."),
    }
}

fn is_field_path(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'))
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

/// Convert IpamError to HTTP response
impl IntoResponse for IpamError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match &self {
            IpamError::Unauthenticated | IpamError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized".to_string(),
                None,
            ),
            IpamError::Forbidden(reason) => (StatusCode::FORBIDDEN, reason.clone(), None),
            IpamError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "The given data was invalid.".to_string(),
                Some(fields.clone()),
            ),
            IpamError::NotFound(what) => (StatusCode::NOT_FOUND, what.clone(), None),
            IpamError::Conflict(what) => (StatusCode::CONFLICT, what.clone(), None),
            IpamError::StorageUnavailable(e) => {
                tracing::error!(error = %e, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(), // Don't leak details
                    None,
                )
            }
            IpamError::Internal(e) => {
                tracing::error!(error = %e, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        crate::metrics::record_error(self.code());

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
            errors,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type IpamResult<T> = Result<T, IpamError>;
