//! Ownership checks for listing edits and deletes, and authorship checks for review deletes.
//!
//! ```text
//! load listing ── missing ──▶ NotFound
//!      │
//! resolve owner ── orphaned ──▶ bind principal as owner (logged, once) ──┐
//!      │ ◀──────────────────────────────────────────────────────────────┘
//! compare to principal ──▶ Allow | Deny (Forbidden)
//! ```

use tracing::{debug, info, warn};
use uuid::Uuid;

use stay_types::api::Principal;
use stay_types::models::{Listing, Review};

use crate::error::ListingError;
use crate::listings::fetch_listing;
use crate::state::{AppState, remember_principal, with_db};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerState {
    Bound(Uuid),
    /// Legacy record with no owner.
    Orphaned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

pub fn owner_state(listing: &Listing) -> OwnerState {
    match listing.owner {
        Some(owner) => OwnerState::Bound(owner),
        None => OwnerState::Orphaned,
    }
}

/// Identity comparison of opaque ids.
pub fn decide(owner: Uuid, principal: &Principal) -> Decision {
    if owner == principal.id {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

fn listing_not_found() -> ListingError {
    ListingError::NotFound("Listing not found.".to_string())
}

/// Authorize `principal` to modify or delete the listing. Returns the listing as loaded
/// after any repair.
pub async fn authorize_listing(
    state: &AppState,
    listing_id: Uuid,
    principal: &Principal,
) -> Result<Listing, ListingError> {
    let mut listing = fetch_listing(state, listing_id)
        .await?
        .ok_or_else(listing_not_found)?;

    if owner_state(&listing) == OwnerState::Orphaned {
        listing = heal_orphan(state, listing_id, principal).await?;
    }

    let OwnerState::Bound(owner) = owner_state(&listing) else {
        return Err(ListingError::Persistence(anyhow::anyhow!(
            "listing {} still has no owner after repair",
            listing_id
        )));
    };

    match decide(owner, principal) {
        Decision::Allow => {
            debug!("{} may modify listing {}", principal.id, listing_id);
            Ok(listing)
        }
        Decision::Deny => {
            info!(
                "Denied {} ({}) on listing {} owned by {}",
                principal.username, principal.id, listing_id, owner
            );
            Err(ListingError::Forbidden {
                listing_id,
                message: "You don't have permission to modify this listing.".to_string(),
            })
        }
    }
}

/// Bind the principal as owner of an ownerless listing and reload it.
/// The store only writes when the owner is still unset, so a concurrent repair
/// by someone else wins and is then evaluated normally.
async fn heal_orphan(
    state: &AppState,
    listing_id: Uuid,
    principal: &Principal,
) -> Result<Listing, ListingError> {
    remember_principal(state, principal).await?;

    let id = listing_id.to_string();
    let owner = principal.id.to_string();
    let repaired = with_db(state, "set_owner_if_unset", move |db| {
        db.set_owner_if_unset(&id, &owner)
    })
    .await?;

    if repaired {
        warn!(
            "Listing {} had no owner; assigned {} ({})",
            listing_id, principal.username, principal.id
        );
    }

    fetch_listing(state, listing_id)
        .await?
        .ok_or_else(listing_not_found)
}

/// Authorize `principal` to delete a review on a listing.
pub async fn authorize_review(
    state: &AppState,
    listing_id: Uuid,
    review_id: Uuid,
    principal: &Principal,
) -> Result<Review, ListingError> {
    let listing = fetch_listing(state, listing_id)
        .await?
        .ok_or_else(listing_not_found)?;

    let review_not_found = || ListingError::NotFound("Review not found.".to_string());
    if !listing.reviews.contains(&review_id) {
        return Err(review_not_found());
    }

    let id = review_id.to_string();
    let review = with_db(state, "get_review", move |db| db.get_review(&id))
        .await?
        .map(|row| crate::convert::review_from_row(&row))
        .ok_or_else(review_not_found)?;

    match decide(review.author, principal) {
        Decision::Allow => Ok(review),
        Decision::Deny => {
            info!(
                "Denied {} ({}) on review {} by {}",
                principal.username, principal.id, review_id, review.author
            );
            Err(ListingError::Forbidden {
                listing_id,
                message: "You are not the author of this review.".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(id: Uuid) -> Principal {
        Principal {
            id,
            username: "alice".into(),
        }
    }

    #[test]
    fn decision_is_identity_equality() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(decide(a, &principal(a)), Decision::Allow);
        assert_eq!(decide(a, &principal(b)), Decision::Deny);
    }
}
