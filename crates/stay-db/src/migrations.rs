use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- owner_id is nullable only so that legacy orphans can be represented and repaired.
            CREATE TABLE listings (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                price           REAL,
                location        TEXT NOT NULL,
                country         TEXT NOT NULL,
                category        TEXT NOT NULL DEFAULT 'trending',
                image_url       TEXT,
                image_filename  TEXT,
                lng             REAL,
                lat             REAL,
                owner_id        TEXT REFERENCES users(id),
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_listings_category ON listings(category);

            CREATE TABLE reviews (
                id          TEXT PRIMARY KEY,
                rating      INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment     TEXT NOT NULL,
                author_id   TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- The listing's ordered list of review references.
            CREATE TABLE listing_reviews (
                listing_id  TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                review_id   TEXT NOT NULL REFERENCES reviews(id) ON DELETE CASCADE,
                position    INTEGER NOT NULL,
                PRIMARY KEY (listing_id, review_id)
            );

            CREATE INDEX idx_listing_reviews_order
                ON listing_reviews(listing_id, position);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
