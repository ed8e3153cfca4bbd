use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Category, Geometry, ImageRef};

// -- JWT Claims --

/// Claims issued by the authentication service. `sub` is the principal id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

/// The authenticated caller of a mutating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
        }
    }
}

// -- Listings --

#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListingSummary {
    pub id: Uuid,
    pub title: String,
    pub price: Option<f64>,
    pub location: String,
    pub country: String,
    pub category: Category,
    pub image: Option<ImageRef>,
    pub owner_username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListingDetail {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub location: String,
    pub country: String,
    pub category: Category,
    pub image: Option<ImageRef>,
    pub geometry: Option<Geometry>,
    pub owner: Option<Uuid>,
    pub owner_username: Option<String>,
    /// `[lat, lng]` for map widgets.
    pub latlng: Option<[f64; 2]>,
    pub reviews: Vec<ReviewResponse>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

// -- Reviews --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReviewRequest {
    pub review: ReviewFields,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewFields {
    pub rating: serde_json::Value,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub rating: u8,
    pub comment: String,
    pub author: Uuid,
    pub author_username: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Errors --

/// Tagged error returned to the view layer.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}
