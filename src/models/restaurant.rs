//! Restaurant record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::extraction::{ImageClassification, Menu};

/// Enrichable text fields on a restaurant record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    Description,
    CuisineType,
    Atmosphere,
    PriceRange,
    Phone,
    OpeningHours,
    ScrapedContent,
}

impl RecordField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::CuisineType => "cuisine_type",
            Self::Atmosphere => "atmosphere",
            Self::PriceRange => "price_range",
            Self::Phone => "phone",
            Self::OpeningHours => "opening_hours",
            Self::ScrapedContent => "scraped_content",
        }
    }
}

/// A restaurant as stored in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub country: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub website: Option<String>,
    pub email: Option<String>,
    /// Award rating, 0 to 3.
    pub michelin_stars: u8,
    /// IANA zone name derived from the country, e.g. `Europe/Paris`.
    pub timezone: Option<String>,
    pub description: Option<String>,
    pub cuisine_type: Option<String>,
    /// Tier string from `$` to `$$$$`.
    pub price_range: Option<String>,
    pub atmosphere: Option<String>,
    pub phone: Option<String>,
    pub opening_hours: Option<String>,
    /// Source URL from the seed dataset.
    pub original_url: Option<String>,
    pub scraped_content: Option<String>,
    /// SHA-256 of the raw page content behind `scraped_content`.
    pub content_hash: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Restaurant {
    /// Natural key used for upserts.
    pub fn natural_key(&self) -> (&str, &str, &str) {
        (&self.name, &self.city, &self.country)
    }

    /// Has this record been through at least one accepted enrichment?
    pub fn is_enriched(&self) -> bool {
        self.scraped_at.is_some()
    }

    /// URL to enrich from: website first, then the seed source URL.
    pub fn target_url(&self) -> Option<&str> {
        self.website
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.original_url.as_deref().filter(|s| !s.trim().is_empty()))
    }

    /// Current value of an enrichable field, treating blanks as absent.
    pub fn field(&self, field: RecordField) -> Option<&str> {
        let value = match field {
            RecordField::Description => self.description.as_deref(),
            RecordField::CuisineType => self.cuisine_type.as_deref(),
            RecordField::Atmosphere => self.atmosphere.as_deref(),
            RecordField::PriceRange => self.price_range.as_deref(),
            RecordField::Phone => self.phone.as_deref(),
            RecordField::OpeningHours => self.opening_hours.as_deref(),
            RecordField::ScrapedContent => self.scraped_content.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn set_field(&mut self, field: RecordField, value: String) {
        let slot = match field {
            RecordField::Description => &mut self.description,
            RecordField::CuisineType => &mut self.cuisine_type,
            RecordField::Atmosphere => &mut self.atmosphere,
            RecordField::PriceRange => &mut self.price_range,
            RecordField::Phone => &mut self.phone,
            RecordField::OpeningHours => &mut self.opening_hours,
            RecordField::ScrapedContent => &mut self.scraped_content,
        };
        *slot = Some(value);
    }
}

/// Seed data for creating a restaurant record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRestaurant {
    pub name: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub michelin_stars: u8,
    #[serde(default)]
    pub price_range: Option<String>,
    #[serde(default)]
    pub cuisine_type: Option<String>,
}

impl NewRestaurant {
    pub fn new(name: &str, city: &str, country: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            city: city.trim().to_string(),
            country: country.trim().to_string(),
            ..Default::default()
        }
    }

    pub fn with_website(mut self, website: &str) -> Self {
        self.website = Some(website.to_string());
        self
    }
}

/// Typed projection of an accepted extraction, applied through the merge rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentPatch {
    pub description: Option<String>,
    pub cuisine_type: Option<String>,
    pub atmosphere: Option<String>,
    pub price_range: Option<String>,
    pub phone: Option<String>,
    pub opening_hours: Option<String>,
    pub scraped_content: Option<String>,
    pub content_hash: Option<String>,
    /// Replaces the stored menu when it has at least one item.
    pub menu: Option<Menu>,
    /// Upserted by image URL.
    pub images: Vec<ImageClassification>,
    pub scraped_at: DateTime<Utc>,
}

impl EnrichmentPatch {
    /// An empty patch stamped with the given scrape time.
    pub fn empty(scraped_at: DateTime<Utc>) -> Self {
        Self {
            description: None,
            cuisine_type: None,
            atmosphere: None,
            price_range: None,
            phone: None,
            opening_hours: None,
            scraped_content: None,
            content_hash: None,
            menu: None,
            images: Vec::new(),
            scraped_at,
        }
    }

    /// Extracted value for a field, treating blanks as absent.
    pub fn field(&self, field: RecordField) -> Option<&str> {
        let value = match field {
            RecordField::Description => self.description.as_deref(),
            RecordField::CuisineType => self.cuisine_type.as_deref(),
            RecordField::Atmosphere => self.atmosphere.as_deref(),
            RecordField::PriceRange => self.price_range.as_deref(),
            RecordField::Phone => self.phone.as_deref(),
            RecordField::OpeningHours => self.opening_hours.as_deref(),
            RecordField::ScrapedContent => self.scraped_content.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}
