mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use stay_api::geocode::{DisabledGeocoder, Geocoder, MapboxGeocoder};
use stay_api::handlers;
use stay_api::image::{CloudinaryStore, ImageStore, LocalImageStore, MAX_IMAGE_SIZE};
use stay_api::middleware::require_auth;
use stay_api::state::{AppState, AppStateInner};
use stay_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "stay=debug,stay_api=debug,stay_db=debug,tower_http=debug".into()
            }),
        )
        .init();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Database::open(&config.db_path)?;

    let geocoder: Arc<dyn Geocoder> = match config.mapbox_token.clone() {
        Some(token) => Arc::new(MapboxGeocoder::new(token, config.geocode_timeout)),
        None => {
            info!("MAPBOX_TOKEN not set, new listings get the fallback point");
            Arc::new(DisabledGeocoder)
        }
    };

    let images: Arc<dyn ImageStore> = match config.cloudinary.take() {
        Some(creds) => Arc::new(CloudinaryStore::new(
            creds.cloud_name,
            creds.api_key,
            creds.api_secret,
            config.upload_timeout,
        )),
        None => Arc::new(LocalImageStore::new(config.upload_dir.clone())),
    };

    let state: AppState = Arc::new(AppStateInner {
        db,
        geocoder,
        images,
        jwt_secret: config.jwt_secret.clone(),
        geocode_timeout: config.geocode_timeout,
        upload_timeout: config.upload_timeout,
    });

    let public_routes = Router::new()
        .route("/listings", get(handlers::index))
        .route("/listings/{id}", get(handlers::show))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/listings", post(handlers::create))
        .route(
            "/listings/{id}",
            put(handlers::update).delete(handlers::destroy),
        )
        .route("/listings/{id}/reviews", post(handlers::create_review))
        .route(
            "/listings/{id}/reviews/{review_id}",
            delete(handlers::destroy_review),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE + 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Stay server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(_) => {
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
