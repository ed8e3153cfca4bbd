//! End-to-end tests of the listing pipeline against an in-memory store, with the
//! geocoding and image hosts replaced by in-process fakes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    middleware,
    routing::{delete, post},
};
use bytes::Bytes;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use stay_api::error::ListingError;
use stay_api::geocode::{GeocodeError, GeocodeQuery, Geocoder};
use stay_api::image::{ImageStore, UploadError, UploadRequest, UploadedImage};
use stay_api::listings::{self, ListingSubmission};
use stay_api::middleware::require_auth;
use stay_api::normalize::Submission;
use stay_api::reviews;
use stay_api::state::{AppState, AppStateInner};
use stay_api::handlers;
use stay_db::Database;
use stay_types::api::{Claims, ListingQuery, Principal, ReviewFields};
use stay_types::models::{Category, Geometry, ImageRef};

const SECRET: &str = "pipeline-test-secret";
const ASPEN: [f64; 2] = [-106.8175, 39.1911];

struct FakeGeocoder {
    calls: AtomicUsize,
    answer: Option<Geometry>,
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn forward(&self, query: &GeocodeQuery) -> Result<Option<Geometry>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if query.query.ends_with("Atlantis") {
            return Ok(None);
        }
        Ok(self.answer)
    }
}

struct FakeImages {
    fail: bool,
}

#[async_trait]
impl ImageStore for FakeImages {
    async fn upload(&self, request: UploadRequest) -> Result<UploadedImage, UploadError> {
        if self.fail {
            return Err(UploadError::Request("host unreachable".into()));
        }
        Ok(UploadedImage {
            url: format!("https://images.test/StayBnb/{}", request.filename),
            filename: format!("StayBnb/{}", request.filename),
        })
    }
}

fn state_with(answer: Option<Geometry>, fail_uploads: bool) -> (AppState, Arc<FakeGeocoder>) {
    let geocoder = Arc::new(FakeGeocoder {
        calls: AtomicUsize::new(0),
        answer,
    });
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        geocoder: geocoder.clone(),
        images: Arc::new(FakeImages { fail: fail_uploads }),
        jwt_secret: SECRET.to_string(),
        geocode_timeout: Duration::from_secs(1),
        upload_timeout: Duration::from_secs(1),
    });
    (state, geocoder)
}

fn state() -> AppState {
    state_with(Some(Geometry::point(ASPEN[0], ASPEN[1])), false).0
}

fn user(name: &str) -> Principal {
    Principal {
        id: Uuid::new_v4(),
        username: name.to_string(),
    }
}

fn fields(value: Value) -> Submission {
    value.as_object().cloned().unwrap()
}

fn cabin_fields() -> Submission {
    fields(json!({
        "Listing": {
            "title": "Cabin",
            "description": "Cozy",
            "price": 100,
            "location": "Aspen",
            "country": "USA",
            "category": "mountain"
        }
    }))
}

fn image(name: &str) -> UploadRequest {
    UploadRequest {
        filename: name.to_string(),
        content_type: Some("image/jpeg".to_string()),
        data: Bytes::from_static(b"\xff\xd8\xff\xe0JFIF"),
    }
}

async fn create_cabin(state: &AppState, owner: &Principal) -> stay_types::models::Listing {
    listings::create_listing(
        state,
        owner,
        ListingSubmission {
            fields: cabin_fields(),
            image: Some(image("cabin.jpg")),
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn create_with_image_geocodes_and_binds() {
    let state = state();
    let alice = user("alice");

    let listing = create_cabin(&state, &alice).await;

    assert_eq!(listing.category, Category::Mountain);
    assert_eq!(listing.owner, Some(alice.id));
    assert_eq!(listing.geometry.unwrap().coordinates, ASPEN);
    assert_ne!(listing.geometry, Some(Geometry::fallback()));
    assert_eq!(
        listing.image.unwrap().url,
        "https://images.test/StayBnb/cabin.jpg"
    );
}

#[tokio::test]
async fn create_without_category_is_rejected() {
    let state = state();
    let mut submitted = cabin_fields();
    submitted["Listing"].as_object_mut().unwrap().remove("category");

    let err = listings::create_listing(
        &state,
        &user("alice"),
        ListingSubmission {
            fields: submitted,
            image: None,
        },
    )
    .await
    .unwrap_err();

    match err {
        ListingError::Validation(msg) => assert!(msg.contains("category"), "{}", msg),
        other => panic!("expected validation error, got {:?}", other),
    }
    let all = listings::list_listings(&state, ListingQuery::default()).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn create_accepts_every_category_and_bare_keys() {
    let state = state();
    let alice = user("alice");

    for category in Category::ALL {
        let listing = listings::create_listing(
            &state,
            &alice,
            ListingSubmission {
                fields: fields(json!({
                    "title": "Somewhere",
                    "description": "Nice",
                    "location": "Oslo",
                    "country": "Norway",
                    "category": category.as_str(),
                })),
                image: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(listing.category, category);
        assert!(listing.image.is_none());
    }
}

#[tokio::test]
async fn create_from_mixed_shapes_keeps_bare_fields() {
    let state = state();
    let listing = listings::create_listing(
        &state,
        &user("alice"),
        ListingSubmission {
            fields: fields(json!({
                "Listing[title]": "Cabin",
                "title": "Ignored",
                "description": "Cozy",
                "location": "Aspen",
                "country": "USA",
                "Listing[category]": "",
                "category": "farm",
            })),
            image: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(listing.title, "Cabin");
    assert_eq!(listing.location, "Aspen");
    assert_eq!(listing.category, Category::Farm);

    let detail = listings::show_listing(&state, listing.id).await.unwrap();
    assert_eq!(detail.latlng, Some([ASPEN[1], ASPEN[0]]));
}

#[tokio::test]
async fn unresolvable_address_still_creates_with_fallback_point() {
    let (state, _) = state_with(None, false);
    let listing = listings::create_listing(
        &state,
        &user("alice"),
        ListingSubmission {
            fields: cabin_fields(),
            image: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(listing.geometry, Some(Geometry::fallback()));
}

#[tokio::test]
async fn failed_upload_fails_creation_without_writing() {
    let (state, _) = state_with(Some(Geometry::point(1.0, 2.0)), true);
    let err = listings::create_listing(
        &state,
        &user("alice"),
        ListingSubmission {
            fields: cabin_fields(),
            image: Some(image("cabin.jpg")),
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ListingError::Upload(_)));
    let all = listings::list_listings(&state, ListingQuery::default()).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn partial_update_keeps_geometry_image_and_category() {
    let (state, geocoder) = state_with(Some(Geometry::point(ASPEN[0], ASPEN[1])), false);
    let alice = user("alice");
    let created = create_cabin(&state, &alice).await;
    let calls_after_create = geocoder.calls.load(Ordering::SeqCst);

    let updated = listings::update_listing(
        &state,
        &alice,
        created.id,
        ListingSubmission {
            fields: fields(json!({ "Listing[title]": "Log Cabin", "Listing[location]": "Vail" })),
            image: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.title, "Log Cabin");
    assert_eq!(updated.location, "Vail");
    assert_eq!(updated.description, "Cozy");
    assert_eq!(updated.category, Category::Mountain);
    assert_eq!(updated.geometry, created.geometry);
    assert_eq!(updated.image, created.image);
    assert_eq!(updated.owner, Some(alice.id));
    assert_eq!(geocoder.calls.load(Ordering::SeqCst), calls_after_create);
}

#[tokio::test]
async fn failed_store_write_after_upload_leaves_listing_unchanged() {
    let (state, _) = state_with(Some(Geometry::point(ASPEN[0], ASPEN[1])), false);
    let alice = user("alice");
    let created = create_cabin(&state, &alice).await;

    state
        .db
        .with_conn_mut(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER freeze_listings BEFORE UPDATE ON listings
                 BEGIN SELECT RAISE(ABORT, 'read only'); END;",
            )?;
            Ok(())
        })
        .unwrap();

    let err = listings::update_listing(
        &state,
        &alice,
        created.id,
        ListingSubmission {
            fields: fields(json!({ "title": "Renamed" })),
            image: Some(image("new.jpg")),
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ListingError::Persistence(_)));
    let after = listings::fetch_listing(&state, created.id).await.unwrap().unwrap();
    assert_eq!(after, created);
}

#[tokio::test]
async fn update_with_full_address_regeocodes_and_replaces_image() {
    let state = state();
    let alice = user("alice");
    let created = create_cabin(&state, &alice).await;

    let updated = listings::update_listing(
        &state,
        &alice,
        created.id,
        ListingSubmission {
            fields: fields(json!({
                "Listing": { "location": "Aspen", "country": "USA" },
                "category": "castle"
            })),
            image: Some(image("new.jpg")),
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.category, Category::Castle);
    assert_eq!(updated.geometry.unwrap().coordinates, ASPEN);
    assert_eq!(
        updated.image,
        Some(ImageRef {
            url: "https://images.test/StayBnb/new.jpg".into(),
            filename: "StayBnb/new.jpg".into(),
        })
    );
}

#[tokio::test]
async fn unmatched_address_on_update_keeps_stored_point() {
    let state = state();
    let alice = user("alice");
    let created = create_cabin(&state, &alice).await;
    assert_eq!(created.geometry.unwrap().coordinates, ASPEN);

    let updated = listings::update_listing(
        &state,
        &alice,
        created.id,
        ListingSubmission {
            fields: fields(json!({ "location": "Nowhere", "country": "Atlantis" })),
            image: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.location, "Nowhere");
    assert_eq!(updated.country, "Atlantis");
    assert_eq!(updated.geometry, created.geometry);
}

#[tokio::test]
async fn non_owner_cannot_edit_or_delete() {
    let state = state();
    let alice = user("alice");
    let bob = user("bob");
    let created = create_cabin(&state, &alice).await;

    let err = listings::update_listing(
        &state,
        &bob,
        created.id,
        ListingSubmission {
            fields: fields(json!({ "title": "Mine now" })),
            image: Some(image("bob.jpg")),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ListingError::Forbidden { listing_id, .. } if listing_id == created.id));

    let err = listings::delete_listing(&state, &bob, created.id).await.unwrap_err();
    assert!(matches!(err, ListingError::Forbidden { .. }));

    let after = listings::fetch_listing(&state, created.id).await.unwrap().unwrap();
    assert_eq!(after, created);
}

#[tokio::test]
async fn unknown_listing_is_not_found() {
    let state = state();
    let err = listings::delete_listing(&state, &user("alice"), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ListingError::NotFound(_)));
    assert_eq!(err.redirect().as_deref(), Some("/listings"));
}

#[tokio::test]
async fn orphaned_listing_is_claimed_once() {
    let state = state();
    let alice = user("alice");
    let bob = user("bob");
    let created = create_cabin(&state, &alice).await;

    let id = created.id.to_string();
    state
        .db
        .with_conn_mut(|conn| {
            conn.execute("UPDATE listings SET owner_id = NULL WHERE id = ?1", [&id])?;
            Ok(())
        })
        .unwrap();

    let updated = listings::update_listing(
        &state,
        &bob,
        created.id,
        ListingSubmission {
            fields: fields(json!({ "title": "Claimed" })),
            image: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.owner, Some(bob.id));

    // The repair does not repeat for the next caller.
    let err = listings::delete_listing(&state, &alice, created.id).await.unwrap_err();
    assert!(matches!(err, ListingError::Forbidden { .. }));
}

#[tokio::test]
async fn deleting_listing_removes_its_reviews() {
    let state = state();
    let alice = user("alice");
    let bob = user("bob");
    let listing = create_cabin(&state, &alice).await;

    let mut review_ids = Vec::new();
    for (rating, comment) in [(5, "Great"), (4, "Good")] {
        let review = reviews::create_review(
            &state,
            &bob,
            listing.id,
            ReviewFields {
                rating: json!(rating),
                comment: Some(comment.to_string()),
            },
        )
        .await
        .unwrap();
        review_ids.push(review.id);
    }

    let detail = listings::show_listing(&state, listing.id).await.unwrap();
    assert_eq!(detail.reviews.len(), 2);
    assert_eq!(detail.reviews[0].author_username, "bob");

    listings::delete_listing(&state, &alice, listing.id).await.unwrap();

    for id in review_ids {
        assert!(state.db.get_review(&id.to_string()).unwrap().is_none());
    }
    assert!(matches!(
        listings::show_listing(&state, listing.id).await,
        Err(ListingError::NotFound(_))
    ));
}

#[tokio::test]
async fn only_author_deletes_review() {
    let state = state();
    let alice = user("alice");
    let bob = user("bob");
    let listing = create_cabin(&state, &alice).await;

    let review = reviews::create_review(
        &state,
        &bob,
        listing.id,
        ReviewFields {
            rating: json!(3),
            comment: Some("Fine".into()),
        },
    )
    .await
    .unwrap();

    let err = reviews::delete_review(&state, &alice, listing.id, review.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ListingError::Forbidden { .. }));

    reviews::delete_review(&state, &bob, listing.id, review.id).await.unwrap();
    let detail = listings::show_listing(&state, listing.id).await.unwrap();
    assert!(detail.reviews.is_empty());
    assert_eq!(detail.title, "Cabin");

    let err = reviews::delete_review(&state, &bob, listing.id, review.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ListingError::NotFound(_)));
}

#[tokio::test]
async fn review_on_missing_listing_is_not_found() {
    let state = state();
    let err = reviews::create_review(
        &state,
        &user("bob"),
        Uuid::new_v4(),
        ReviewFields {
            rating: json!(5),
            comment: Some("?".into()),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ListingError::NotFound(_)));
}

#[tokio::test]
async fn index_filters_and_searches() {
    let state = state();
    let alice = user("alice");
    create_cabin(&state, &alice).await;
    listings::create_listing(
        &state,
        &alice,
        ListingSubmission {
            fields: fields(json!({
                "title": "Beach Hut",
                "description": "Sandy",
                "price": "250",
                "location": "Tulum",
                "country": "Mexico",
                "category": "beach",
            })),
            image: None,
        },
    )
    .await
    .unwrap();

    let query = |category: Option<&str>, search: Option<&str>| ListingQuery {
        category: category.map(str::to_string),
        search: search.map(str::to_string),
    };

    let beach = listings::list_listings(&state, query(Some("beach"), None)).await.unwrap();
    assert_eq!(beach.len(), 1);
    assert_eq!(beach[0].owner_username.as_deref(), Some("alice"));

    let ranged = listings::list_listings(&state, query(None, Some("50-150"))).await.unwrap();
    assert_eq!(ranged.len(), 1);
    assert_eq!(ranged[0].title, "Cabin");

    let text = listings::list_listings(&state, query(None, Some("mexico"))).await.unwrap();
    assert_eq!(text.len(), 1);

    let bogus = listings::list_listings(&state, query(Some("moon"), None)).await.unwrap();
    assert!(bogus.is_empty());
}

// ── Over HTTP ───────────────────────────────────────────────────────────

fn bearer(principal: &Principal) -> String {
    let claims = Claims {
        sub: principal.id,
        username: principal.username.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/listings", post(handlers::create))
        .route("/listings/{id}", delete(handlers::destroy))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

#[tokio::test]
async fn http_create_requires_token() {
    let state = state();
    let resp = app(state)
        .oneshot(
            Request::post("/listings")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(Value::Object(cabin_fields()).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn http_delete_by_other_user_is_forbidden() {
    let state = state();
    let alice = user("alice");
    let bob = user("bob");
    let listing = create_cabin(&state, &alice).await;

    let resp = app(state.clone())
        .oneshot(
            Request::delete(format!("/listings/{}", listing.id))
                .header(header::AUTHORIZATION, bearer(&bob))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["kind"], "forbidden");
    assert_eq!(body["redirect"], format!("/listings/{}", listing.id));

    assert!(listings::fetch_listing(&state, listing.id).await.unwrap().is_some());
}

#[tokio::test]
async fn http_create_over_json() {
    let state = state();
    let alice = user("alice");

    let resp = app(state)
        .oneshot(
            Request::post("/listings")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer(&alice))
                .body(Body::from(Value::Object(cabin_fields()).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["category"], "mountain");
    assert_eq!(body["owner"], alice.id.to_string());
    assert_eq!(body["geometry"]["type"], "Point");
}
