use std::sync::Arc;
use std::time::Duration;

use stay_db::Database;
use stay_types::api::Principal;
use tracing::error;

use crate::error::ListingError;
use crate::geocode::Geocoder;
use crate::image::ImageStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub geocoder: Arc<dyn Geocoder>,
    pub images: Arc<dyn ImageStore>,
    pub jwt_secret: String,
    pub geocode_timeout: Duration,
    pub upload_timeout: Duration,
}

/// Run a store call off the async runtime. `op` names the call in error logs.
pub async fn with_db<F, T>(state: &AppState, op: &'static str, f: F) -> Result<T, ListingError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.clone();
    tokio::task::spawn_blocking(move || f(&db.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error during {}: {}", op, e);
            ListingError::Persistence(anyhow::anyhow!("{} did not complete: {}", op, e))
        })?
        .map_err(|e| {
            error!("DB {} error: {:#}", op, e);
            ListingError::Persistence(e)
        })
}

/// Make sure the caller has a user row so owner and author references resolve.
pub async fn remember_principal(state: &AppState, principal: &Principal) -> Result<(), ListingError> {
    let id = principal.id.to_string();
    let username = principal.username.clone();
    with_db(state, "upsert_user", move |db| db.upsert_user(&id, &username)).await
}
