use crate::domain::error::PaymentError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype over the domain error so the HTTP mapping lives in the adapter
/// layer and nowhere else.
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            PaymentError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            PaymentError::InvalidSignature(_) => (
                StatusCode::FORBIDDEN,
                "invalid_signature",
                "notification signature rejected".to_string(),
            ),
            PaymentError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            PaymentError::AlreadyOwned => (
                StatusCode::CONFLICT,
                "already_owned",
                "item already owned by this user".to_string(),
            ),
            PaymentError::GatewayUnreachable(msg) => {
                tracing::warn!("gateway unreachable: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "gateway_unreachable",
                    "payment gateway unreachable, retry later".to_string(),
                )
            }
            // 5xx so the gateway redelivers the notification.
            PaymentError::AccessGrant(msg) => {
                tracing::error!("access grant failure: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "access_grant_failure",
                    "internal error".to_string(),
                )
            }
            PaymentError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            PaymentError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
