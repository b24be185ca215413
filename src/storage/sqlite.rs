use crate::model::{Listing, ListingFields, ListingFilter, RawFieldMap, StorageError, ValidationError, field};
use crate::normalizer::ErrorSink;
use crate::utils::current_year;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::VecDeque;
use std::path::Path;
use tracing::warn;

const LISTING_COLUMNS: &str =
    "rowid, title, link, location, price, information, image, brand, year, distance_covered, fetched_at";

/// What an upsert did to the row keyed by the listing's link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    Unchanged,
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the dataset file and runs migrations.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open(db_path)?)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS listings (
                link TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                location TEXT NOT NULL,
                price REAL NOT NULL CHECK (price > 0),
                information TEXT NOT NULL DEFAULT '',
                brand TEXT NOT NULL,
                year INTEGER NOT NULL,
                distance_covered REAL NOT NULL CHECK (distance_covered >= 0),
                fetched_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rejections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link TEXT,
                reason TEXT NOT NULL,
                raw TEXT NOT NULL,
                rejected_at TEXT NOT NULL
            );
            ",
        )?;

        // Older dataset files predate image capture.
        Self::migrate_add_column_if_missing(&conn, "listings", "image", "TEXT")?;

        Ok(Self { conn })
    }

    /// Adds `column` to `table` unless it already exists.
    fn migrate_add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        column_def: &str,
    ) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !existing_columns.iter().any(|c| c == column) {
            conn.execute(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_def), [])?;
        }

        Ok(())
    }

    /// Idempotent merge keyed by `link`: identical content is a no-op, changed
    /// content replaces the stored values.
    pub fn upsert(&self, listing: &Listing) -> Result<UpsertOutcome, StorageError> {
        let outcome = match self.get(listing.link())? {
            None => UpsertOutcome::Inserted,
            Some(existing) if existing.same_content(listing) => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Replaced,
        };

        self.conn.execute(
            "INSERT INTO listings (
                link, title, location, price, information, image,
                brand, year, distance_covered, fetched_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(link) DO UPDATE SET
                title = excluded.title,
                location = excluded.location,
                price = excluded.price,
                information = excluded.information,
                image = excluded.image,
                brand = excluded.brand,
                year = excluded.year,
                distance_covered = excluded.distance_covered,
                fetched_at = excluded.fetched_at",
            params![
                listing.link(),
                listing.title(),
                listing.location(),
                listing.price(),
                listing.information(),
                listing.image(),
                listing.brand(),
                listing.year(),
                listing.distance_covered(),
                listing.fetched_at().to_rfc3339(),
            ],
        )?;

        Ok(outcome)
    }

    pub fn get(&self, link: &str) -> Result<Option<Listing>, StorageError> {
        let sql = format!("SELECT {} FROM listings WHERE link = ?1", LISTING_COLUMNS);
        let listing = self
            .conn
            .query_row(&sql, params![link], |row| Self::map_listing(row).map(|(_, l)| l))
            .optional()?;
        Ok(listing)
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn rejection_count(&self) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM rejections", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Lazily walks the listings matching `filter` in insertion order.
    pub fn scan(&self, filter: ListingFilter) -> ListingScan<'_> {
        ListingScan::new(self, filter, 256)
    }

    /// Rows with `rowid > after`, ordered by rowid.
    fn fetch_batch(&self, after: i64, limit: usize) -> Result<Vec<(i64, Listing)>, StorageError> {
        let sql = format!(
            "SELECT {} FROM listings WHERE rowid > ?1 ORDER BY rowid ASC LIMIT ?2",
            LISTING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![after, limit as i64], |row| Self::map_listing(row))?;

        let mut batch = Vec::new();
        for row in rows {
            batch.push(row?);
        }
        Ok(batch)
    }

    fn map_listing(row: &Row) -> Result<(i64, Listing), rusqlite::Error> {
        let fetched_at_str: String = row.get(10)?;
        let fetched_at: DateTime<Utc> = fetched_at_str.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let fields = ListingFields {
            title: row.get(1)?,
            link: row.get(2)?,
            location: row.get(3)?,
            price: row.get(4)?,
            information: row.get(5)?,
            image: row.get(6)?,
            brand: row.get(7)?,
            year: row.get(8)?,
            distance_covered: row.get(9)?,
        };
        let listing = Listing::with_fetched_at(fields, current_year(), fetched_at).map_err(|e: ValidationError| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok((row.get(0)?, listing))
    }
}

impl ErrorSink for SqliteStorage {
    fn record_rejection(&self, raw: &RawFieldMap, error: &ValidationError) {
        let result = self.conn.execute(
            "INSERT INTO rejections (link, reason, raw, rejected_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                raw.get(field::LINK),
                error.to_string(),
                format!("{:?}", raw),
                Utc::now().to_rfc3339(),
            ],
        );
        if let Err(e) = result {
            warn!("Failed to persist rejection: {:?}", e);
        }
    }
}

/// Lazy, restartable cursor over stored listings. Rows are read in batches
/// keyed on rowid, so rows appended during the walk are still visited.
pub struct ListingScan<'a> {
    storage: &'a SqliteStorage,
    filter: ListingFilter,
    batch_size: usize,
    cursor: i64,
    buffer: VecDeque<Listing>,
    exhausted: bool,
}

impl<'a> ListingScan<'a> {
    fn new(storage: &'a SqliteStorage, filter: ListingFilter, batch_size: usize) -> Self {
        Self {
            storage,
            filter,
            batch_size: batch_size.max(1),
            cursor: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Rewinds to the first row.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.buffer.clear();
        self.exhausted = false;
    }

    fn fill(&mut self) -> Result<(), StorageError> {
        while self.buffer.is_empty() && !self.exhausted {
            let batch = self.storage.fetch_batch(self.cursor, self.batch_size)?;
            if batch.len() < self.batch_size {
                self.exhausted = true;
            }
            for (rowid, listing) in batch {
                self.cursor = rowid;
                if self.filter.matches(&listing) {
                    self.buffer.push_back(listing);
                }
            }
        }
        Ok(())
    }
}

impl Iterator for ListingScan<'_> {
    type Item = Result<Listing, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.fill() {
            self.exhausted = true;
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}
