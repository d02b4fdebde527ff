//! Row parsing helpers for the restaurant repository.

use chrono::Utc;

use crate::models::Restaurant;
use crate::repository::{parse_datetime, parse_datetime_opt};

/// Parse a database row into a Restaurant.
pub fn row_to_restaurant(row: &rusqlite::Row) -> rusqlite::Result<Restaurant> {
    Ok(Restaurant {
        id: row.get("id")?,
        name: row.get("name")?,
        city: row.get("city")?,
        country: row.get("country")?,
        address: row.get("address")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        website: row.get("website")?,
        email: row.get("email")?,
        michelin_stars: row.get::<_, i64>("michelin_stars")?.clamp(0, 3) as u8,
        timezone: row.get("timezone")?,
        description: row.get("description")?,
        cuisine_type: row.get("cuisine_type")?,
        price_range: row.get("price_range")?,
        atmosphere: row.get("atmosphere")?,
        phone: row.get("phone")?,
        opening_hours: row.get("opening_hours")?,
        original_url: row.get("original_url")?,
        scraped_content: row.get("scraped_content")?,
        content_hash: row.get("content_hash")?,
        scraped_at: parse_datetime_opt(row.get("scraped_at")?),
        created_at: row
            .get::<_, Option<String>>("created_at")?
            .map(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, Option<String>>("updated_at")?
            .map(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}
