//! Row → domain conversion. Corrupt stored values are logged and replaced, never fatal.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use stay_db::models::{ListingRow, ReviewRow};
use stay_types::api::ReviewResponse;
use stay_types::models::{Category, Geometry, ImageRef, Listing, Review};

pub fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", raw, context, e);
            DateTime::default()
        })
}

fn parse_id(raw: &str, what: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on {}: {}", what, raw, context, e);
        Uuid::default()
    })
}

pub fn listing_from_row(row: ListingRow) -> Listing {
    let context = format!("listing '{}'", row.id);

    let category = row.category.parse::<Category>().unwrap_or_else(|e| {
        warn!("{} on {}, reading as default", e, context);
        Category::default()
    });

    let image = match (row.image_url, row.image_filename) {
        (Some(url), Some(filename)) => Some(ImageRef { url, filename }),
        (Some(url), None) => Some(ImageRef {
            url,
            filename: String::new(),
        }),
        _ => None,
    };

    let geometry = match (row.lng, row.lat) {
        (Some(lng), Some(lat)) => Some(Geometry::point(lng, lat)),
        _ => None,
    };

    Listing {
        id: parse_id(&row.id, "id", &context),
        title: row.title,
        description: row.description,
        price: row.price,
        location: row.location,
        country: row.country,
        category,
        image,
        geometry,
        owner: row.owner_id.as_deref().map(|o| parse_id(o, "owner_id", &context)),
        reviews: row
            .review_ids
            .iter()
            .map(|r| parse_id(r, "review id", &context))
            .collect(),
        created_at: parse_timestamp(&row.created_at, &context),
        updated_at: parse_timestamp(&row.updated_at, &context),
    }
}

pub fn review_from_row(row: &ReviewRow) -> Review {
    let context = format!("review '{}'", row.id);
    Review {
        id: parse_id(&row.id, "id", &context),
        rating: row.rating.clamp(1, 5) as u8,
        comment: row.comment.clone(),
        author: parse_id(&row.author_id, "author_id", &context),
        created_at: parse_timestamp(&row.created_at, &context),
    }
}

pub fn review_response(row: ReviewRow) -> ReviewResponse {
    let review = review_from_row(&row);
    ReviewResponse {
        id: review.id,
        rating: review.rating,
        comment: review.comment,
        author: review.author,
        author_username: row.author_username.unwrap_or_else(|| "unknown".to_string()),
        created_at: review.created_at,
    }
}
