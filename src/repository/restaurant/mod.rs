//! Restaurant record store.

mod helpers;
mod media;

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{format_datetime, RepositoryError, Result};
use crate::extraction::timezone_for_country;
use crate::merge;
use crate::models::{EnrichmentPatch, ImageClassification, Menu, NewRestaurant, Restaurant};
use helpers::row_to_restaurant;

/// SQLite-backed repository for restaurant records.
#[derive(Debug, Clone)]
pub struct RestaurantRepository {
    db_path: PathBuf,
}

impl RestaurantRepository {
    /// Create a new restaurant repository.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS restaurants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                city TEXT NOT NULL DEFAULT '',
                country TEXT NOT NULL DEFAULT '',
                address TEXT,
                latitude REAL,
                longitude REAL,
                website TEXT,
                email TEXT,
                michelin_stars INTEGER NOT NULL DEFAULT 0,
                timezone TEXT,

                -- Enrichment fields, written only through the merge rules
                description TEXT,
                cuisine_type TEXT,
                price_range TEXT,
                atmosphere TEXT,
                phone TEXT,
                opening_hours TEXT,

                original_url TEXT,
                scraped_content TEXT,
                content_hash TEXT,
                scraped_at TEXT,

                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,

                UNIQUE(name, city, country)
            );

            CREATE INDEX IF NOT EXISTS idx_restaurants_scraped_at
                ON restaurants(scraped_at);
            CREATE INDEX IF NOT EXISTS idx_restaurants_website
                ON restaurants(website);

            CREATE TABLE IF NOT EXISTS menu_sections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                restaurant_id INTEGER NOT NULL REFERENCES restaurants(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                position INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_menu_sections_restaurant
                ON menu_sections(restaurant_id, position);

            CREATE TABLE IF NOT EXISTS menu_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                section_id INTEGER NOT NULL REFERENCES menu_sections(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                price TEXT,
                description TEXT,
                position INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_menu_items_section
                ON menu_items(section_id, position);

            CREATE TABLE IF NOT EXISTS restaurant_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                restaurant_id INTEGER NOT NULL REFERENCES restaurants(id) ON DELETE CASCADE,
                url TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'uncategorized',
                category_confidence REAL NOT NULL DEFAULT 0,
                labels TEXT NOT NULL DEFAULT '[]',
                description TEXT,
                description_confidence REAL NOT NULL DEFAULT 0,
                classified_at TEXT NOT NULL,

                UNIQUE(restaurant_id, url)
            );
        "#,
        )?;
        Ok(())
    }

    /// Insert a seed record, or fill gaps on the existing one with the same
    /// natural key. Enrichment fields that already hold a value are kept.
    /// The timezone is derived from the country.
    pub fn upsert_seed(&self, seed: &NewRestaurant) -> Result<i64> {
        let conn = self.connect()?;
        let now = format_datetime(&Utc::now());

        let id: i64 = conn.query_row(
            r#"
            INSERT INTO restaurants (
                name, city, country, address, latitude, longitude, website,
                original_url, phone, michelin_stars, price_range, cuisine_type,
                timezone, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?14, ?13, ?13)
            ON CONFLICT(name, city, country) DO UPDATE SET
                address = COALESCE(NULLIF(restaurants.address, ''), excluded.address),
                latitude = COALESCE(restaurants.latitude, excluded.latitude),
                longitude = COALESCE(restaurants.longitude, excluded.longitude),
                website = COALESCE(NULLIF(restaurants.website, ''), excluded.website),
                original_url = COALESCE(NULLIF(restaurants.original_url, ''), excluded.original_url),
                phone = COALESCE(NULLIF(restaurants.phone, ''), excluded.phone),
                michelin_stars = excluded.michelin_stars,
                price_range = COALESCE(NULLIF(restaurants.price_range, ''), excluded.price_range),
                cuisine_type = COALESCE(NULLIF(restaurants.cuisine_type, ''), excluded.cuisine_type),
                timezone = COALESCE(restaurants.timezone, excluded.timezone),
                updated_at = excluded.updated_at
            RETURNING id
            "#,
            params![
                seed.name,
                seed.city,
                seed.country,
                seed.address,
                seed.latitude,
                seed.longitude,
                seed.website,
                seed.original_url,
                seed.phone,
                seed.michelin_stars.min(3) as i64,
                seed.price_range,
                seed.cuisine_type,
                now,
                timezone_for_country(&seed.country),
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Get a restaurant by id.
    pub fn get(&self, id: i64) -> Result<Option<Restaurant>> {
        let conn = self.connect()?;
        let restaurant = conn
            .query_row(
                "SELECT * FROM restaurants WHERE id = ?",
                params![id],
                row_to_restaurant,
            )
            .optional()?;
        Ok(restaurant)
    }

    /// Get a restaurant by its natural key.
    pub fn find_by_key(&self, name: &str, city: &str, country: &str) -> Result<Option<Restaurant>> {
        let conn = self.connect()?;
        let restaurant = conn
            .query_row(
                "SELECT * FROM restaurants WHERE name = ? AND city = ? AND country = ?",
                params![name, city, country],
                row_to_restaurant,
            )
            .optional()?;
        Ok(restaurant)
    }

    /// Find the record a URL belongs to.
    pub fn find_by_url(&self, url: &str) -> Result<Option<Restaurant>> {
        let conn = self.connect()?;
        let restaurant = conn
            .query_row(
                r#"
                SELECT * FROM restaurants
                WHERE website = ?1 OR original_url = ?1
                ORDER BY id ASC
                LIMIT 1
                "#,
                params![url],
                row_to_restaurant,
            )
            .optional()?;
        Ok(restaurant)
    }

    /// Records that have a URL but no accepted enrichment yet.
    /// Starred restaurants come first.
    pub fn list_needing_enrichment(&self, limit: usize) -> Result<Vec<Restaurant>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM restaurants
            WHERE scraped_at IS NULL
            AND (COALESCE(website, '') != '' OR COALESCE(original_url, '') != '')
            ORDER BY michelin_stars DESC, id ASC
            LIMIT ?
        "#,
        )?;

        let restaurants = stmt
            .query_map(params![limit as i64], row_to_restaurant)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(restaurants)
    }

    /// List records, newest first.
    pub fn list(&self, limit: usize) -> Result<Vec<Restaurant>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM restaurants ORDER BY id DESC LIMIT ?")?;
        let restaurants = stmt
            .query_map(params![limit as i64], row_to_restaurant)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(restaurants)
    }

    /// Returns (total, enriched).
    pub fn counts(&self) -> Result<(u64, u64)> {
        let conn = self.connect()?;
        let counts = conn.query_row(
            "SELECT COUNT(*), COUNT(scraped_at) FROM restaurants",
            [],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
        )?;
        Ok(counts)
    }

    /// Stored menu of a record, sections and items in extraction order.
    pub fn menu(&self, id: i64) -> Result<Menu> {
        let conn = self.connect()?;
        media::load_menu(&conn, id)
    }

    /// Stored image classifications of a record, by URL.
    pub fn images(&self, id: i64) -> Result<Vec<ImageClassification>> {
        let conn = self.connect()?;
        media::load_images(&conn, id)
    }

    /// Merge an accepted extraction into a record in a single transaction.
    ///
    /// The current row is read, merged through the field rules and written
    /// back while holding the write lock, so concurrent merges on the same
    /// record serialize instead of overwriting each other. A non-empty menu
    /// replaces the stored one; image classifications are upserted by URL.
    pub fn apply_enrichment(
        &self,
        id: i64,
        patch: &EnrichmentPatch,
        force: bool,
    ) -> Result<Restaurant> {
        let conn = self.connect()?;

        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<Restaurant> = (|| {
            let existing = conn
                .query_row(
                    "SELECT * FROM restaurants WHERE id = ?",
                    params![id],
                    row_to_restaurant,
                )
                .optional()?
                .ok_or_else(|| RepositoryError::NotFound(format!("restaurant {}", id)))?;

            let mut merged = merge::merge(&existing, patch, force);
            merged.updated_at = Utc::now();

            conn.execute(
                r#"
                UPDATE restaurants SET
                    description = ?2,
                    cuisine_type = ?3,
                    price_range = ?4,
                    atmosphere = ?5,
                    phone = ?6,
                    opening_hours = ?7,
                    scraped_content = ?8,
                    content_hash = ?9,
                    scraped_at = ?10,
                    updated_at = ?11
                WHERE id = ?1
                "#,
                params![
                    id,
                    merged.description,
                    merged.cuisine_type,
                    merged.price_range,
                    merged.atmosphere,
                    merged.phone,
                    merged.opening_hours,
                    merged.scraped_content,
                    merged.content_hash,
                    merged.scraped_at.as_ref().map(format_datetime),
                    format_datetime(&merged.updated_at),
                ],
            )?;

            if let Some(menu) = patch.menu.as_ref().filter(|m| !m.is_empty()) {
                media::replace_menu(&conn, id, menu)?;
            }
            media::upsert_images(&conn, id, &patch.images, &patch.scraped_at)?;

            Ok(merged)
        })();

        if result.is_ok() {
            conn.execute("COMMIT", [])?;
            debug!("Merged enrichment into restaurant {}", id);
        } else {
            let _ = conn.execute("ROLLBACK", []);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed(name: &str) -> NewRestaurant {
        NewRestaurant::new(name, "Lyon", "France").with_website("https://example.com")
    }

    #[test]
    fn test_upsert_by_natural_key_is_idempotent() {
        let dir = tempdir().unwrap();
        let repo = RestaurantRepository::new(&dir.path().join("t.db")).unwrap();

        let first = repo.upsert_seed(&seed("La Mère Brazier")).unwrap();
        let second = repo.upsert_seed(&seed("La Mère Brazier")).unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.counts().unwrap(), (1, 0));
    }

    #[test]
    fn test_seed_upsert_keeps_enriched_fields() {
        let dir = tempdir().unwrap();
        let repo = RestaurantRepository::new(&dir.path().join("t.db")).unwrap();
        let id = repo.upsert_seed(&seed("Paul Bocuse")).unwrap();

        let mut patch = EnrichmentPatch::empty(Utc::now());
        patch.cuisine_type = Some("Classic French".to_string());
        repo.apply_enrichment(id, &patch, false).unwrap();

        let mut reseed = seed("Paul Bocuse");
        reseed.cuisine_type = Some("Modern Cuisine".to_string());
        repo.upsert_seed(&reseed).unwrap();

        let stored = repo.get(id).unwrap().unwrap();
        assert_eq!(stored.cuisine_type.as_deref(), Some("Classic French"));
        assert!(stored.is_enriched());
    }

    #[test]
    fn test_needing_enrichment_excludes_enriched_and_urlless() {
        let dir = tempdir().unwrap();
        let repo = RestaurantRepository::new(&dir.path().join("t.db")).unwrap();

        let a = repo.upsert_seed(&seed("A")).unwrap();
        repo.upsert_seed(&seed("B")).unwrap();
        repo.upsert_seed(&NewRestaurant::new("C", "Lyon", "France"))
            .unwrap();

        repo.apply_enrichment(a, &EnrichmentPatch::empty(Utc::now()), false)
            .unwrap();

        let pending = repo.list_needing_enrichment(10).unwrap();
        let names: Vec<_> = pending.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["B"]);
    }

    #[test]
    fn test_seed_gets_timezone_from_country() {
        let dir = tempdir().unwrap();
        let repo = RestaurantRepository::new(&dir.path().join("t.db")).unwrap();

        let lyon = repo.upsert_seed(&seed("Têtedoie")).unwrap();
        let nowhere = repo
            .upsert_seed(&NewRestaurant::new("Floating", "Sea", "International Waters"))
            .unwrap();

        assert_eq!(
            repo.get(lyon).unwrap().unwrap().timezone.as_deref(),
            Some("Europe/Paris")
        );
        assert!(repo.get(nowhere).unwrap().unwrap().timezone.is_none());
    }

    #[test]
    fn test_find_by_key() {
        let dir = tempdir().unwrap();
        let repo = RestaurantRepository::new(&dir.path().join("t.db")).unwrap();
        let id = repo.upsert_seed(&seed("Le Kitchen Café")).unwrap();

        let found = repo.find_by_key("Le Kitchen Café", "Lyon", "France").unwrap();
        assert_eq!(found.map(|r| r.id), Some(id));
        assert!(repo.find_by_key("Le Kitchen Café", "Paris", "France").unwrap().is_none());
    }

    #[test]
    fn test_apply_enrichment_missing_record() {
        let dir = tempdir().unwrap();
        let repo = RestaurantRepository::new(&dir.path().join("t.db")).unwrap();
        let err = repo
            .apply_enrichment(42, &EnrichmentPatch::empty(Utc::now()), false)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }
}
