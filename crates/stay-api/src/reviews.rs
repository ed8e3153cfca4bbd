use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use stay_types::api::{Principal, ReviewFields, ReviewResponse};

use crate::convert::review_response;
use crate::error::ListingError;
use crate::guard::authorize_review;
use crate::state::{AppState, remember_principal, with_db};

/// Check a review body. Returns `(rating, comment)`.
pub fn validate_review(fields: &ReviewFields) -> Result<(u8, String), ListingError> {
    let mut errors = Vec::new();

    let rating = match &fields.rating {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let rating = match rating {
        None => {
            errors.push("\"rating\" must be a number".to_string());
            None
        }
        Some(r) if r.fract() != 0.0 => {
            errors.push("\"rating\" must be an integer".to_string());
            None
        }
        Some(r) if r < 1.0 => {
            errors.push("\"rating\" must be greater than or equal to 1".to_string());
            None
        }
        Some(r) if r > 5.0 => {
            errors.push("\"rating\" must be less than or equal to 5".to_string());
            None
        }
        Some(r) => Some(r as u8),
    };

    let comment = match fields.comment.as_deref().map(str::trim) {
        None => {
            errors.push("\"comment\" is required".to_string());
            None
        }
        Some("") => {
            errors.push("\"comment\" is not allowed to be empty".to_string());
            None
        }
        Some(c) => Some(c.to_string()),
    };

    match (rating, comment) {
        (Some(rating), Some(comment)) if errors.is_empty() => Ok((rating, comment)),
        _ => Err(ListingError::Validation(errors.join(", "))),
    }
}

/// Add a review by `principal` to an existing listing.
pub async fn create_review(
    state: &AppState,
    principal: &Principal,
    listing_id: Uuid,
    fields: ReviewFields,
) -> Result<ReviewResponse, ListingError> {
    let (rating, comment) = validate_review(&fields)?;

    remember_principal(state, principal).await?;

    let review_id = Uuid::new_v4();
    let listing_key = listing_id.to_string();
    let review_key = review_id.to_string();
    let author = principal.id.to_string();
    let added = with_db(state, "add_review", move |db| {
        if !db.add_review(&listing_key, &review_key, rating, &comment, &author)? {
            return Ok(None);
        }
        db.get_review(&review_key)
    })
    .await?;

    let row = added.ok_or_else(|| ListingError::NotFound("Listing not found.".to_string()))?;
    info!("Review {} added to listing {} by {}", review_id, listing_id, principal.username);
    Ok(review_response(row))
}

/// Delete a review. Only its author may do so.
pub async fn delete_review(
    state: &AppState,
    principal: &Principal,
    listing_id: Uuid,
    review_id: Uuid,
) -> Result<(), ListingError> {
    authorize_review(state, listing_id, review_id, principal).await?;

    let listing_key = listing_id.to_string();
    let review_key = review_id.to_string();
    let removed = with_db(state, "remove_review", move |db| {
        db.remove_review(&listing_key, &review_key)
    })
    .await?;

    if !removed {
        return Err(ListingError::NotFound("Review not found.".to_string()));
    }

    info!("Review {} removed from listing {}", review_id, listing_id);
    Ok(())
}
