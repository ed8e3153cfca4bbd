//! Address → coordinate resolution.
//!
//! Geocoding is advisory: [`resolve`] never fails. A missing match, an upstream
//! error, or a timeout all degrade to [`GeocodeOutcome::Degraded`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use stay_types::models::Geometry;

const MAPBOX_PLACES_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places";

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Request(String),
    #[error("invalid geocoding response: {0}")]
    Response(String),
    #[error("geocoding timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeQuery {
    pub query: String,
    pub limit: u8,
}

impl GeocodeQuery {
    /// Best single match for `"<location>, <country>"`.
    pub fn for_address(location: &str, country: &str) -> Self {
        Self {
            query: format!("{}, {}", location, country),
            limit: 1,
        }
    }
}

/// Forward geocoding service.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the service answered but found nothing.
    async fn forward(&self, query: &GeocodeQuery) -> Result<Option<Geometry>, GeocodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeocodeOutcome {
    Matched(Geometry),
    Degraded,
}

impl GeocodeOutcome {
    pub fn matched(self) -> Option<Geometry> {
        match self {
            Self::Matched(g) => Some(g),
            Self::Degraded => None,
        }
    }

    pub fn or_fallback(self) -> Geometry {
        self.matched().unwrap_or_else(Geometry::fallback)
    }
}

/// Resolve an address, bounded by `timeout`. Never returns an error.
pub async fn resolve(
    geocoder: &dyn Geocoder,
    location: &str,
    country: &str,
    timeout: Duration,
) -> GeocodeOutcome {
    let query = GeocodeQuery::for_address(location, country);

    let result = match tokio::time::timeout(timeout, geocoder.forward(&query)).await {
        Ok(result) => result,
        Err(_) => Err(GeocodeError::Timeout(timeout)),
    };

    match result {
        Ok(Some(geometry)) => {
            debug!("Geocoded '{}' to {:?}", query.query, geometry.coordinates);
            GeocodeOutcome::Matched(geometry)
        }
        Ok(None) => {
            warn!("No geocoding match for '{}', using fallback point", query.query);
            GeocodeOutcome::Degraded
        }
        Err(e) => {
            warn!("Geocoding '{}' degraded: {}", query.query, e);
            GeocodeOutcome::Degraded
        }
    }
}

// ── Mapbox ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
}

pub struct MapboxGeocoder {
    http: Client,
    token: String,
    base_url: String,
}

impl MapboxGeocoder {
    pub fn new(token: String, timeout: Duration) -> Self {
        Self {
            http: build_client(timeout),
            token,
            base_url: MAPBOX_PLACES_URL.to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for MapboxGeocoder {
    async fn forward(&self, query: &GeocodeQuery) -> Result<Option<Geometry>, GeocodeError> {
        let url = format!("{}/{}.json", self.base_url, urlencoding::encode(&query.query));

        let limit = query.limit.to_string();

        let resp = self
            .http
            .get(&url)
            .query(&[("access_token", self.token.as_str()), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| GeocodeError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GeocodeError::Request(format!("status {}", resp.status())));
        }

        let body: FeatureCollection = resp
            .json()
            .await
            .map_err(|e| GeocodeError::Response(e.to_string()))?;

        Ok(first_match(body))
    }
}

fn first_match(collection: FeatureCollection) -> Option<Geometry> {
    collection.features.into_iter().next().map(|f| f.geometry)
}

/// Used when no access token is configured. Every lookup finds nothing.
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn forward(&self, _query: &GeocodeQuery) -> Result<Option<Geometry>, GeocodeError> {
        Ok(None)
    }
}

pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .build()
        .unwrap_or_else(|_| Client::new())
}
