//! Row types as stored in SQLite. Ids and timestamps stay as text here and are
//! parsed into domain types by the API layer.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

pub struct ListingRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub location: String,
    pub country: String,
    pub category: String,
    pub image_url: Option<String>,
    pub image_filename: Option<String>,
    pub lng: Option<f64>,
    pub lat: Option<f64>,
    pub owner_id: Option<String>,
    pub owner_username: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Review ids in list order. Left empty by the index query.
    pub review_ids: Vec<String>,
}

pub struct ReviewRow {
    pub id: String,
    pub rating: i64,
    pub comment: String,
    pub author_id: String,
    pub author_username: Option<String>,
    pub created_at: String,
}

/// Column values for a new listing. The owner is bound at creation.
pub struct NewListing<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub price: Option<f64>,
    pub location: &'a str,
    pub country: &'a str,
    pub category: &'a str,
    pub image: Option<(&'a str, &'a str)>,
    pub geometry: (f64, f64),
    pub owner_id: &'a str,
}

/// A partial listing update. `None` leaves the stored column untouched.
/// There is deliberately no owner column here.
#[derive(Default)]
pub struct ListingChanges<'a> {
    pub title: Option<&'a str>,
    pub description: Option<&'a str>,
    pub price: Option<f64>,
    pub location: Option<&'a str>,
    pub country: Option<&'a str>,
    pub category: Option<&'a str>,
    pub image: Option<(&'a str, &'a str)>,
    pub geometry: Option<(f64, f64)>,
}

pub enum ListingSearch {
    /// Inclusive price range.
    PriceRange(f64, f64),
    Price(f64),
    /// Case-insensitive substring over title, category, location and country.
    Text(String),
}

#[derive(Default)]
pub struct ListingFilter {
    pub category: Option<String>,
    pub search: Option<ListingSearch>,
}
