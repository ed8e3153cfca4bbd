use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use uuid::Uuid;

use stay_types::api::ErrorBody;

/// Failures of the listing and review pipeline, tagged for the view layer.
///
/// Geocoding failures never appear here: they are absorbed by
/// [`crate::geocode::resolve`] and replaced by the fallback point.
#[derive(Debug, Error)]
pub enum ListingError {
    /// Malformed or missing field. The message is shown to the user verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Forbidden { listing_id: Uuid, message: String },

    /// The image host failed or timed out. Uploads are never skipped silently.
    #[error("image upload failed: {0}")]
    Upload(String),

    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl ListingError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Upload(_) => "upload",
            Self::Persistence(_) => "persistence",
        }
    }

    /// Where the client should send the user next. Form errors have no redirect:
    /// the client re-renders the form it still holds.
    pub fn redirect(&self) -> Option<String> {
        match self {
            Self::NotFound(_) => Some("/listings".to_string()),
            Self::Forbidden { listing_id, .. } => Some(format!("/listings/{}", listing_id)),
            Self::Validation(_) | Self::Upload(_) | Self::Persistence(_) => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Upload(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Persistence(_) => "Something went wrong. Please try again.".to_string(),
            Self::Upload(_) => "Image upload failed. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ListingError {
    fn into_response(self) -> Response {
        // Persistence causes are logged where they occur, with the store operation.
        let body = ErrorBody {
            kind: self.kind().to_string(),
            message: self.public_message(),
            redirect: self.redirect(),
        };
        (self.status(), Json(body)).into_response()
    }
}
