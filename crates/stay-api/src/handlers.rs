//! HTTP boundary. Decodes requests into submissions and maps results to responses;
//! all decisions live in the listing and review modules.

use axum::{
    Extension, Form, Json,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::Value;

use stay_types::api::{CreateReviewRequest, ListingQuery, Principal};

use crate::error::ListingError;
use crate::image::UploadRequest;
use crate::listings::{self, ListingSubmission, parse_listing_id};
use crate::normalize::Submission;
use crate::reviews;
use crate::state::AppState;

/// Form part carrying the listing image.
const IMAGE_FIELD: &str = "image";

/// Decode a listing body: multipart (with optional image), urlencoded form, or JSON.
pub async fn read_submission(req: Request) -> Result<ListingSubmission, ListingError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| ListingError::Validation(e.body_text()))?;
        read_multipart(multipart).await
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, &())
            .await
            .map_err(|e| ListingError::Validation(e.body_text()))?;
        let mut fields = Submission::new();
        for (name, value) in pairs {
            fields.insert(name, Value::String(value));
        }
        Ok(ListingSubmission { fields, image: None })
    } else {
        let Json(fields) = Json::<Submission>::from_request(req, &())
            .await
            .map_err(|e| ListingError::Validation(e.body_text()))?;
        Ok(ListingSubmission { fields, image: None })
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<ListingSubmission, ListingError> {
    let mut submission = ListingSubmission::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ListingError::Validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == IMAGE_FIELD {
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ListingError::Validation(e.body_text()))?;

            // Browsers send an empty part when no file was chosen.
            if !data.is_empty() || !filename.is_empty() {
                submission.image = Some(UploadRequest {
                    filename,
                    content_type,
                    data,
                });
            }
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| ListingError::Validation(e.body_text()))?;
        submission.fields.insert(name, Value::String(text));
    }

    Ok(submission)
}

/// GET /listings
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<impl IntoResponse, ListingError> {
    Ok(Json(listings::list_listings(&state, query).await?))
}

/// GET /listings/{id}
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ListingError> {
    let id = parse_listing_id(&id)?;
    Ok(Json(listings::show_listing(&state, id).await?))
}

/// POST /listings
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    req: Request,
) -> Result<impl IntoResponse, ListingError> {
    let submission = read_submission(req).await?;
    let listing = listings::create_listing(&state, &principal, submission).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// PUT /listings/{id}
pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    req: Request,
) -> Result<impl IntoResponse, ListingError> {
    let id = parse_listing_id(&id)?;
    let submission = read_submission(req).await?;
    let listing = listings::update_listing(&state, &principal, id, submission).await?;
    Ok(Json(listing))
}

/// DELETE /listings/{id}
pub async fn destroy(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ListingError> {
    let id = parse_listing_id(&id)?;
    listings::delete_listing(&state, &principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /listings/{id}/reviews
pub async fn create_review(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse, ListingError> {
    let id = parse_listing_id(&id)?;
    let review = reviews::create_review(&state, &principal, id, req.review).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// DELETE /listings/{id}/reviews/{review_id}
pub async fn destroy_review(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, review_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ListingError> {
    let id = parse_listing_id(&id)?;
    let review_id = review_id
        .parse()
        .map_err(|_| ListingError::NotFound("Review not found.".to_string()))?;
    reviews::delete_review(&state, &principal, id, review_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn urlencoded_bracket_keys_survive_decoding() {
        let req = Request::builder()
            .method("POST")
            .uri("/listings")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("Listing%5Btitle%5D=Cabin&category=mountain"))
            .unwrap();

        let submission = read_submission(req).await.unwrap();
        assert_eq!(submission.fields["Listing[title]"], "Cabin");
        assert_eq!(submission.fields["category"], "mountain");
        assert!(submission.image.is_none());
    }

    #[tokio::test]
    async fn multipart_splits_fields_and_image() {
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"Listing[title]\"\r\n\r\nCabin\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"cabin.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n--{b}--\r\n",
            b = boundary
        );
        let req = Request::builder()
            .method("POST")
            .uri("/listings")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();

        let submission = read_submission(req).await.unwrap();
        assert_eq!(submission.fields["Listing[title]"], "Cabin");
        let image = submission.image.unwrap();
        assert_eq!(image.filename, "cabin.png");
        assert_eq!(image.content_type.as_deref(), Some("image/png"));
        assert_eq!(&image.data[..], b"PNGDATA");
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let req = Request::builder()
            .method("POST")
            .uri("/listings")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        assert!(matches!(
            read_submission(req).await,
            Err(ListingError::Validation(_))
        ));
    }
}
