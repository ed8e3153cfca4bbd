//! Administrative repair of listings that lost their owner.

use anyhow::Result;
use tracing::{info, warn};

use crate::Database;
use crate::models::ListingRow;
use crate::queries::delete_listing_cascade;

impl Database {
    pub fn list_orphan_listings(&self) -> Result<Vec<ListingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, price, location, country, category,
                        image_url, image_filename, lng, lat, created_at, updated_at
                 FROM listings
                 WHERE owner_id IS NULL
                 ORDER BY created_at",
            )?;

            let rows = stmt
                .query_map([], |row| {
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
                        owner_id: None,
                        owner_username: None,
                        created_at: row.get(11)?,
                        updated_at: row.get(12)?,
                        review_ids: Vec::new(),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Bind `user_id` as owner of every orphaned listing. Returns the number repaired.
    pub fn assign_orphans(&self, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let repaired = conn.execute(
                "UPDATE listings SET owner_id = ?1, updated_at = datetime('now')
                 WHERE owner_id IS NULL",
                [user_id],
            )?;
            info!("Assigned owner {} to {} orphaned listing(s)", user_id, repaired);
            Ok(repaired)
        })
    }

    /// Delete every orphaned listing along with its reviews, in one transaction.
    pub fn delete_orphans(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let ids = {
                let mut stmt = tx.prepare("SELECT id FROM listings WHERE owner_id IS NULL")?;
                stmt.query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let mut deleted = 0;
            for id in &ids {
                if delete_listing_cascade(&tx, id)?.is_some() {
                    deleted += 1;
                }
            }

            tx.commit()?;
            warn!("Deleted {} orphaned listing(s)", deleted);
            Ok(deleted)
        })
    }
}
