use crate::Database;
use crate::models::{
    ListingChanges, ListingFilter, ListingRow, ListingSearch, NewListing, ReviewRow, UserRow,
};
use anyhow::Result;
use rusqlite::{Connection, Row, types::ToSql};
use tracing::info;

const LISTING_SELECT: &str = "SELECT l.id, l.title, l.description, l.price, l.location, l.country,
        l.category, l.image_url, l.image_filename, l.lng, l.lat, l.owner_id, u.username,
        l.created_at, l.updated_at
     FROM listings l
     LEFT JOIN users u ON l.owner_id = u.id";

impl Database {
    // -- Users --

    /// Record a principal the first time it shows up; later calls refresh the username.
    pub fn upsert_user(&self, id: &str, username: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET username = excluded.username",
                (id, username),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, created_at FROM users WHERE id = ?1",
                [id],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Listings --

    pub fn insert_listing(&self, listing: &NewListing<'_>) -> Result<()> {
        let (image_url, image_filename) = match listing.image {
            Some((url, filename)) => (Some(url), Some(filename)),
            None => (None, None),
        };
        let (lng, lat) = listing.geometry;

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO listings (id, title, description, price, location, country, category,
                                       image_url, image_filename, lng, lat, owner_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    listing.id,
                    listing.title,
                    listing.description,
                    listing.price,
                    listing.location,
                    listing.country,
                    listing.category,
                    image_url,
                    image_filename,
                    lng,
                    lat,
                    listing.owner_id,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_listing(&self, id: &str) -> Result<Option<ListingRow>> {
        self.with_conn(|conn| query_listing(conn, id))
    }

    /// Apply a partial update in one statement. Returns `false` if the id does not resolve.
    pub fn update_listing(&self, id: &str, changes: &ListingChanges<'_>) -> Result<bool> {
        let (image_url, image_filename) = match changes.image {
            Some((url, filename)) => (Some(url), Some(filename)),
            None => (None, None),
        };
        let (lng, lat) = match changes.geometry {
            Some((lng, lat)) => (Some(lng), Some(lat)),
            None => (None, None),
        };

        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE listings SET
                    title          = COALESCE(?2, title),
                    description    = COALESCE(?3, description),
                    price          = COALESCE(?4, price),
                    location       = COALESCE(?5, location),
                    country        = COALESCE(?6, country),
                    category       = COALESCE(?7, category),
                    image_url      = COALESCE(?8, image_url),
                    image_filename = COALESCE(?9, image_filename),
                    lng            = COALESCE(?10, lng),
                    lat            = COALESCE(?11, lat),
                    updated_at     = datetime('now')
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    changes.title,
                    changes.description,
                    changes.price,
                    changes.location,
                    changes.country,
                    changes.category,
                    image_url,
                    image_filename,
                    lng,
                    lat,
                ],
            )?;
            Ok(updated > 0)
        })
    }

    /// Bind `owner_id` only if the listing currently has no owner.
    /// Returns whether a row was changed; repeated calls are no-ops.
    pub fn set_owner_if_unset(&self, id: &str, owner_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE listings SET owner_id = ?2, updated_at = datetime('now')
                 WHERE id = ?1 AND owner_id IS NULL",
                (id, owner_id),
            )?;
            Ok(updated > 0)
        })
    }

    /// Delete a listing and every review in its list as one transaction.
    /// Returns the number of reviews removed, or `None` if the listing did not exist.
    pub fn delete_listing(&self, id: &str) -> Result<Option<usize>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let removed = delete_listing_cascade(&tx, id)?;
            tx.commit()?;
            Ok(removed)
        })
    }

    pub fn list_listings(&self, filter: &ListingFilter) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| query_listings(conn, filter))
    }

    // -- Reviews --

    /// Insert a review and append it to the listing's review list.
    /// Returns `false` (and writes nothing) if the listing does not exist.
    pub fn add_review(
        &self,
        listing_id: &str,
        review_id: &str,
        rating: u8,
        comment: &str,
        author_id: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            if !listing_exists(&tx, listing_id)? {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO reviews (id, rating, comment, author_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![review_id, rating, comment, author_id],
            )?;
            tx.execute(
                "INSERT INTO listing_reviews (listing_id, review_id, position)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(position), -1) + 1
                                  FROM listing_reviews WHERE listing_id = ?1))",
                (listing_id, review_id),
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    /// Pull the review from the listing's list and delete the review itself.
    /// Returns `false` if the review was not referenced by that listing.
    pub fn remove_review(&self, listing_id: &str, review_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let pulled = tx.execute(
                "DELETE FROM listing_reviews WHERE listing_id = ?1 AND review_id = ?2",
                (listing_id, review_id),
            )?;
            if pulled == 0 {
                return Ok(false);
            }
            tx.execute("DELETE FROM reviews WHERE id = ?1", [review_id])?;

            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_review(&self, id: &str) -> Result<Option<ReviewRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT r.id, r.rating, r.comment, r.author_id, u.username, r.created_at
                 FROM reviews r
                 LEFT JOIN users u ON r.author_id = u.id
                 WHERE r.id = ?1",
                [id],
                review_from_row,
            )
            .optional()
        })
    }

    pub fn get_reviews_for_listing(&self, listing_id: &str) -> Result<Vec<ReviewRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.rating, r.comment, r.author_id, u.username, r.created_at
                 FROM listing_reviews lr
                 JOIN reviews r ON r.id = lr.review_id
                 LEFT JOIN users u ON r.author_id = u.id
                 WHERE lr.listing_id = ?1
                 ORDER BY lr.position",
            )?;

            let rows = stmt
                .query_map([listing_id], review_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

pub(crate) fn listing_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM listings WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Reviews go first, then the listing; `listing_reviews` rows follow by FK cascade.
/// Callers own the surrounding transaction.
pub(crate) fn delete_listing_cascade(conn: &Connection, id: &str) -> Result<Option<usize>> {
    if !listing_exists(conn, id)? {
        return Ok(None);
    }

    let reviews = conn.execute(
        "DELETE FROM reviews
         WHERE id IN (SELECT review_id FROM listing_reviews WHERE listing_id = ?1)",
        [id],
    )?;
    conn.execute("DELETE FROM listings WHERE id = ?1", [id])?;

    info!("Deleted listing {} and {} review(s)", id, reviews);
    Ok(Some(reviews))
}

fn query_listing(conn: &Connection, id: &str) -> Result<Option<ListingRow>> {
    let sql = format!("{} WHERE l.id = ?1", LISTING_SELECT);
    let Some(mut listing) = conn.query_row(&sql, [id], listing_from_row).optional()? else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT review_id FROM listing_reviews WHERE listing_id = ?1 ORDER BY position",
    )?;
    listing.review_ids = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(Some(listing))
}

fn query_listings(conn: &Connection, filter: &ListingFilter) -> Result<Vec<ListingRow>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(category) = &filter.category {
        params.push(Box::new(category.clone()));
        clauses.push("l.category = ?");
    }

    match &filter.search {
        Some(ListingSearch::PriceRange(low, high)) => {
            params.push(Box::new(*low));
            params.push(Box::new(*high));
            clauses.push("l.price BETWEEN ? AND ?");
        }
        Some(ListingSearch::Price(price)) => {
            params.push(Box::new(*price));
            clauses.push("l.price = ?");
        }
        // Matched below: SQLite only folds ASCII case.
        Some(ListingSearch::Text(_)) => {}
        None => {}
    }

    let mut sql = String::from(LISTING_SELECT);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY l.created_at DESC, l.rowid DESC");

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), listing_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    match &filter.search {
        Some(ListingSearch::Text(term)) => {
            let needle = term.to_lowercase();
            Ok(rows
                .into_iter()
                .filter(|row| text_matches(row, &needle))
                .collect())
        }
        _ => Ok(rows),
    }
}

/// Case-insensitive substring match over the searchable columns. `needle` is lowercase.
fn text_matches(row: &ListingRow, needle: &str) -> bool {
    [&row.title, &row.category, &row.location, &row.country]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<ListingRow> {
    Ok(ListingRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        location: row.get(4)?,
        country: row.get(5)?,
        category: row.get(6)?,
        image_url: row.get(7)?,
        image_filename: row.get(8)?,
        lng: row.get(9)?,
        lat: row.get(10)?,
        owner_id: row.get(11)?,
        owner_username: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        review_ids: Vec::new(),
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRow> {
    Ok(ReviewRow {
        id: row.get(0)?,
        rating: row.get(1)?,
        comment: row.get(2)?,
        author_id: row.get(3)?,
        author_username: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
