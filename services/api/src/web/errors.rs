//! services/api/src/web/errors.rs
//!
//! Maps the core's error types onto HTTP responses. Remote failures are logged
//! here and reach the client only as a generic retry message.

use axum::{http::StatusCode, Json};
use coaching_core::credits::CreditError;
use coaching_core::documents::{DocumentError, UploadRejection};
use coaching_core::flows::FlowError;
use coaching_core::packages::PackageError;
use coaching_core::ports::PortError;
use coaching_core::reports::ReportError;
use coaching_core::wizard::{FieldError, SubmitError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

pub const RETRY_MESSAGE: &str = "The action failed, please retry.";

#[derive(Debug, Serialize, ToSchema)]
pub struct FieldErrorBody {
    pub field: String,
    pub message: String,
}

impl From<FieldError> for FieldErrorBody {
    fn from(e: FieldError) -> Self {
        Self {
            field: e.field,
            message: e.message,
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldErrorBody>,
}

pub type HandlerError = (StatusCode, Json<ErrorBody>);
pub type HandlerResult<T> = Result<T, HandlerError>;

pub fn error_response(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            code: None,
            needed: None,
            available: None,
            fields: Vec::new(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> HandlerError {
    error_response(StatusCode::BAD_REQUEST, message)
}

pub fn port_error(e: &PortError) -> HandlerError {
    match e {
        PortError::NotFound(what) => error_response(StatusCode::NOT_FOUND, format!("{} not found", what)),
        PortError::Unauthorized => error_response(StatusCode::UNAUTHORIZED, "Unauthorized"),
        PortError::Unexpected(message) => {
            error!(error = %message, "Remote call failed");
            error_response(StatusCode::BAD_GATEWAY, RETRY_MESSAGE)
        }
    }
}

pub fn credit_error(e: &CreditError) -> HandlerError {
    match e {
        CreditError::Insufficient { needed, available }
        | CreditError::InsufficientHealthScore { needed, available } => {
            let (status, Json(mut body)) = error_response(StatusCode::PAYMENT_REQUIRED, e.to_string());
            body.code = Some("insufficient-credits".to_string());
            body.needed = Some(*needed);
            body.available = Some(*available);
            (status, Json(body))
        }
        CreditError::Remote(port) => port_error(port),
    }
}

pub fn document_error(e: &DocumentError) -> HandlerError {
    match e {
        DocumentError::Rejected(rejection) => {
            let status = match rejection {
                UploadRejection::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_REQUEST,
            };
            let (status, Json(mut body)) = error_response(status, rejection.to_string());
            body.code = Some(rejection.code().to_string());
            (status, Json(body))
        }
        DocumentError::Remote(port) => port_error(port),
    }
}

pub fn report_error(e: &ReportError) -> HandlerError {
    match e {
        ReportError::Invalid(message) => bad_request(message.clone()),
        ReportError::NotFound(id) => error_response(StatusCode::NOT_FOUND, format!("Report {} not found", id)),
        ReportError::Remote(port) => port_error(port),
    }
}

pub fn package_error(e: &PackageError) -> HandlerError {
    match e {
        PackageError::Invalid(message) => bad_request(message.clone()),
        PackageError::Credits(credit) => credit_error(credit),
        PackageError::Remote(port) => port_error(port),
    }
}

pub fn flow_error(e: &FlowError) -> HandlerError {
    match e {
        FlowError::Submit(SubmitError::Invalid(fields)) => {
            let (status, Json(mut body)) = bad_request(e.to_string());
            body.fields = fields.iter().cloned().map(FieldErrorBody::from).collect();
            (status, Json(body))
        }
        FlowError::Submit(SubmitError::PreCheck(message)) => {
            error_response(StatusCode::PAYMENT_REQUIRED, message.clone())
        }
        FlowError::Submit(other) => error_response(StatusCode::CONFLICT, other.to_string()),
        FlowError::Credits(credit) => credit_error(credit),
        FlowError::Report(report) => report_error(report),
        FlowError::Package(package) => package_error(package),
        FlowError::Remote(port) => port_error(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn insufficient_credits_are_payment_required() {
        let (status, Json(body)) = credit_error(&CreditError::Insufficient { needed: 10, available: 8 });
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body.error, "Insufficient credits: need 10, have 8");
        assert_eq!(body.needed, Some(10));
        assert_eq!(body.available, Some(8));
    }

    #[test]
    fn too_large_upload_is_413() {
        let e = DocumentError::Rejected(UploadRejection::TooLarge { size_bytes: 12_000_000 });
        let (status, Json(body)) = document_error(&e);
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body.code.as_deref(), Some("too-large"));
    }

    #[test]
    fn remote_failures_hide_details() {
        let (status, Json(body)) = port_error(&PortError::Unexpected("pool timed out".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.error, RETRY_MESSAGE);

        let (status, _) = report_error(&ReportError::NotFound(Uuid::nil()));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_fields_are_listed() {
        let e = FlowError::Submit(SubmitError::Invalid(vec![FieldError::new("companyName", "required")]));
        let (status, Json(body)) = flow_error(&e);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.fields[0].field, "companyName");
    }
}
