//! Listing operations: index, show, create, update, delete.

use tracing::{info, warn};
use uuid::Uuid;

use stay_db::models::{ListingChanges, ListingFilter, ListingSearch, NewListing};
use stay_types::api::{ListingDetail, ListingQuery, ListingSummary, Principal};
use stay_types::models::{Category, Listing};

use crate::convert::{listing_from_row, review_response};
use crate::error::ListingError;
use crate::geocode;
use crate::guard::authorize_listing;
use crate::image::{self, ImageBinding, UploadRequest};
use crate::normalize::{Submission, normalize};
use crate::state::{AppState, remember_principal, with_db};
use crate::validate::{validate_new, validate_update};

/// A listing form as received: its fields plus an optional image file.
#[derive(Debug, Default)]
pub struct ListingSubmission {
    pub fields: Submission,
    pub image: Option<UploadRequest>,
}

/// Parse a path id. Malformed ids are reported like unknown ones.
pub fn parse_listing_id(raw: &str) -> Result<Uuid, ListingError> {
    raw.parse()
        .map_err(|_| ListingError::NotFound("Invalid listing ID.".to_string()))
}

pub async fn fetch_listing(state: &AppState, id: Uuid) -> Result<Option<Listing>, ListingError> {
    let key = id.to_string();
    let row = with_db(state, "get_listing", move |db| db.get_listing(&key)).await?;
    Ok(row.map(listing_from_row))
}

async fn reload(state: &AppState, id: Uuid) -> Result<Listing, ListingError> {
    fetch_listing(state, id)
        .await?
        .ok_or_else(|| ListingError::NotFound("Listing not found.".to_string()))
}

async fn upload_if_present(
    state: &AppState,
    upload: Option<UploadRequest>,
) -> Result<ImageBinding, ListingError> {
    let uploaded = match upload {
        Some(request) => Some(image::upload(state.images.as_ref(), request, state.upload_timeout).await?),
        None => None,
    };
    Ok(image::bind(uploaded))
}

/// Create a listing owned by `principal`.
pub async fn create_listing(
    state: &AppState,
    principal: &Principal,
    submission: ListingSubmission,
) -> Result<Listing, ListingError> {
    let form = normalize(&submission.fields);
    let fields = validate_new(form.as_ref()).inspect_err(|e| {
        warn!(
            "Rejected new listing from {}: {} (submitted keys: {:?})",
            principal.id,
            e,
            submission.fields.keys().collect::<Vec<_>>()
        );
    })?;

    // Geocoding degrades, uploads fail hard.
    let (outcome, binding) = tokio::join!(
        geocode::resolve(
            state.geocoder.as_ref(),
            &fields.location,
            &fields.country,
            state.geocode_timeout,
        ),
        upload_if_present(state, submission.image),
    );
    let binding = binding?;
    let geometry = outcome.or_fallback();

    remember_principal(state, principal).await?;

    let id = Uuid::new_v4();
    let key = id.to_string();
    let owner = principal.id.to_string();
    let image = binding.apply(None);
    with_db(state, "insert_listing", move |db| {
        db.insert_listing(&NewListing {
            id: &key,
            title: &fields.title,
            description: &fields.description,
            price: fields.price,
            location: &fields.location,
            country: &fields.country,
            category: fields.category.as_str(),
            image: image.as_ref().map(|i| (i.url.as_str(), i.filename.as_str())),
            geometry: (geometry.lng(), geometry.lat()),
            owner_id: &owner,
        })
    })
    .await?;

    info!("Listing {} created by {}", id, principal.username);
    reload(state, id).await
}

/// Apply an owner's edit. Omitted fields, image and address keep their stored values.
pub async fn update_listing(
    state: &AppState,
    principal: &Principal,
    id: Uuid,
    submission: ListingSubmission,
) -> Result<Listing, ListingError> {
    let existing = authorize_listing(state, id, principal).await?;

    let form = normalize(&submission.fields);
    let patch = validate_update(form.as_ref(), Some(existing.category))?;

    // Only a full address triggers a lookup; a miss keeps the stored point.
    let geocode = async {
        match patch.address() {
            Some((location, country)) => geocode::resolve(
                state.geocoder.as_ref(),
                location,
                country,
                state.geocode_timeout,
            )
            .await
            .matched(),
            None => None,
        }
    };
    let (geometry, binding) = tokio::join!(geocode, upload_if_present(state, submission.image));
    let binding = binding?;

    let key = id.to_string();
    let image = binding.replacement().cloned();
    let uploaded = image.as_ref().map(|i| i.filename.clone());
    let written = with_db(state, "update_listing", move |db| {
        db.update_listing(
            &key,
            &ListingChanges {
                title: patch.title.as_deref(),
                description: patch.description.as_deref(),
                price: patch.price,
                location: patch.location.as_deref(),
                country: patch.country.as_deref(),
                category: Some(patch.category.as_str()),
                image: image.as_ref().map(|i| (i.url.as_str(), i.filename.as_str())),
                geometry: geometry.map(|g| (g.lng(), g.lat())),
            },
        )
    })
    .await;

    let found = written.inspect_err(|_| warn_unreferenced(id, uploaded.as_deref()))?;
    if !found {
        warn_unreferenced(id, uploaded.as_deref());
        return Err(ListingError::NotFound("Listing not found.".to_string()));
    }

    info!("Listing {} updated by {}", id, principal.username);
    reload(state, id).await
}

/// The edit was not stored, so a freshly uploaded image is referenced by nothing.
fn warn_unreferenced(id: Uuid, uploaded: Option<&str>) {
    if let Some(filename) = uploaded {
        warn!(
            "Edit of listing {} not stored; uploaded image '{}' is unreferenced",
            id, filename
        );
    }
}

/// Delete a listing and all of its reviews.
pub async fn delete_listing(
    state: &AppState,
    principal: &Principal,
    id: Uuid,
) -> Result<(), ListingError> {
    authorize_listing(state, id, principal).await?;

    let key = id.to_string();
    let removed = with_db(state, "delete_listing", move |db| db.delete_listing(&key)).await?;

    match removed {
        Some(reviews) => {
            info!(
                "Listing {} deleted by {} with {} review(s)",
                id, principal.username, reviews
            );
            Ok(())
        }
        None => Err(ListingError::NotFound("Listing not found.".to_string())),
    }
}

pub async fn show_listing(state: &AppState, id: Uuid) -> Result<ListingDetail, ListingError> {
    let key = id.to_string();
    let loaded = with_db(state, "show_listing", move |db| {
        let Some(row) = db.get_listing(&key)? else {
            return Ok(None);
        };
        let reviews = db.get_reviews_for_listing(&key)?;
        Ok(Some((row, reviews)))
    })
    .await?;

    let (row, reviews) =
        loaded.ok_or_else(|| ListingError::NotFound("Listing does not exist!".to_string()))?;
    let owner_username = row.owner_username.clone();
    let listing = listing_from_row(row);

    Ok(ListingDetail {
        id: listing.id,
        title: listing.title,
        description: listing.description,
        price: listing.price,
        location: listing.location,
        country: listing.country,
        category: listing.category,
        image: listing.image,
        geometry: listing.geometry,
        owner: listing.owner,
        owner_username,
        latlng: listing.geometry.map(|g| g.latlng()),
        reviews: reviews.into_iter().map(review_response).collect(),
        created_at: listing.created_at,
        updated_at: listing.updated_at,
    })
}

/// Interpret a search box entry: `N-M` is a price range, a bare number an exact price,
/// anything else free text.
pub fn parse_search(term: &str) -> Option<ListingSearch> {
    let term = term.trim();
    if term.is_empty() {
        return None;
    }

    if let Some((low, high)) = term.split_once('-') {
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if digits(low) && digits(high) {
            if let (Ok(low), Ok(high)) = (low.parse::<f64>(), high.parse::<f64>()) {
                return Some(ListingSearch::PriceRange(low, high));
            }
        }
    }

    if let Ok(price) = term.parse::<f64>() {
        if price.is_finite() {
            return Some(ListingSearch::Price(price));
        }
    }

    Some(ListingSearch::Text(term.to_string()))
}

pub async fn list_listings(
    state: &AppState,
    query: ListingQuery,
) -> Result<Vec<ListingSummary>, ListingError> {
    let category = query
        .category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(c) = &category {
        if c.parse::<Category>().is_err() {
            return Ok(Vec::new());
        }
    }

    let filter = ListingFilter {
        category,
        search: query.search.as_deref().and_then(parse_search),
    };

    let rows = with_db(state, "list_listings", move |db| db.list_listings(&filter)).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let owner_username = row.owner_username.clone();
            let listing = listing_from_row(row);
            ListingSummary {
                id: listing.id,
                title: listing.title,
                price: listing.price,
                location: listing.location,
                country: listing.country,
                category: listing.category,
                image: listing.image,
                owner_username,
            }
        })
        .collect())
}
