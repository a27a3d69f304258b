use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tether_protocol::NameError;

/// Convenient Result alias.
pub type TetherResult<T> = Result<T, TetherError>;

/// Relay error type.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// No session is registered under the name.
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    /// A session exists but its connection is gone.
    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Invalid name: {0}")]
    InvalidName(#[from] NameError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TetherError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownRecipient(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotConnected(_) => StatusCode::CONFLICT,
            Self::InvalidName(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TetherError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            TetherError::UnknownRecipient("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            TetherError::NotConnected("x".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            TetherError::InvalidName(NameError::Empty).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_config_error_is_internal() {
        let err: TetherError = config::ConfigError::Message("bad port".into()).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
