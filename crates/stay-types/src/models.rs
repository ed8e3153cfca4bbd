use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of listing categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    #[default]
    Trending,
    Beach,
    Room,
    Dome,
    Castle,
    Camping,
    Boat,
    Pool,
    Mountain,
    IconicCities,
    Farm,
    Arctic,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Trending,
        Category::Beach,
        Category::Room,
        Category::Dome,
        Category::Castle,
        Category::Camping,
        Category::Boat,
        Category::Pool,
        Category::Mountain,
        Category::IconicCities,
        Category::Farm,
        Category::Arctic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trending => "trending",
            Self::Beach => "beach",
            Self::Room => "room",
            Self::Dome => "dome",
            Self::Castle => "castle",
            Self::Camping => "camping",
            Self::Boat => "boat",
            Self::Pool => "pool",
            Self::Mountain => "mountain",
            Self::IconicCities => "iconic-cities",
            Self::Farm => "farm",
            Self::Arctic => "arctic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category '{}'", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// GeoJSON point. Coordinates are `[lng, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: GeometryKind,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeometryKind {
    #[default]
    Point,
}

impl Geometry {
    pub fn point(lng: f64, lat: f64) -> Self {
        Self {
            kind: GeometryKind::Point,
            coordinates: [lng, lat],
        }
    }

    /// The `[0, 0]` point used when an address cannot be resolved.
    pub fn fallback() -> Self {
        Self::point(0.0, 0.0)
    }

    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }

    /// `[lat, lng]`, the order map widgets expect.
    pub fn latlng(&self) -> [f64; 2] {
        [self.lat(), self.lng()]
    }
}

/// Reference to an image held by the external image host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub location: String,
    pub country: String,
    pub category: Category,
    pub image: Option<ImageRef>,
    pub geometry: Option<Geometry>,
    /// `None` only for legacy rows awaiting repair.
    pub owner: Option<Uuid>,
    /// Review ids in insertion order.
    pub reviews: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub rating: u8,
    pub comment: String,
    pub author: Uuid,
    pub created_at: DateTime<Utc>,
}
