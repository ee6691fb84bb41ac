use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::error::BadgeError;

/// A [`BadgeError`] rendered as a plain-text HTTP response.
#[derive(Debug)]
pub struct ApiError(pub BadgeError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            BadgeError::Validation(_) | BadgeError::NoRelays => StatusCode::BAD_REQUEST,
            BadgeError::NotFound(_) => StatusCode::NOT_FOUND,
            BadgeError::EventCreation(_) | BadgeError::Client(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<BadgeError> for ApiError {
    fn from(err: BadgeError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}
