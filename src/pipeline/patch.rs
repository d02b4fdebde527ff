//! Projection of an accepted extraction onto the record fields.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::extraction::parse_price_tier;
use crate::models::{EnrichmentPatch, ExtractionResult};

/// Hex SHA-256 of fetched page content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the patch for an accepted result. Price indications are
/// normalized to `$` tiers; anything unparseable is dropped. The menu and
/// image classifications travel with the patch so they are stored in the
/// same transaction as the record fields.
pub fn patch_from(result: &ExtractionResult, scraped_at: DateTime<Utc>) -> EnrichmentPatch {
    let mut patch = EnrichmentPatch::empty(scraped_at);

    if let Some(summary) = &result.summary {
        patch.description = summary.description.clone();
        patch.cuisine_type = summary.cuisine.clone();
        patch.atmosphere = summary.ambiance.clone();
        patch.price_range = summary.price_range.as_deref().and_then(parse_price_tier);
        patch.phone = summary.phone.clone();
        patch.opening_hours = summary.opening_hours.clone();
    }

    patch.menu = result.menu.clone().filter(|m| !m.is_empty());
    patch.images = result.images.clone();
    patch.scraped_content = Some(result.content.clone());
    patch.content_hash = Some(result.content_hash.clone());
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        FetchMethod, ImageCategory, ImageClassification, Menu, MenuItem, MenuSection,
        RestaurantSummary,
    };

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = content_hash("<html>menu</html>");
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash("<html>menu</html>"));
        assert_ne!(a, content_hash("<html>menu!</html>"));
    }

    #[test]
    fn test_patch_normalizes_price_and_carries_content() {
        let mut result = ExtractionResult::new(
            "https://example.com",
            "Clean page text".to_string(),
            "abc123".to_string(),
            FetchMethod::Static,
        );
        result.summary = Some(RestaurantSummary {
            description: Some("Wood-fired cooking".to_string()),
            ambiance: Some("Relaxed".to_string()),
            price_range: Some("££££".to_string()),
            ..Default::default()
        });

        let now = Utc::now();
        let patch = patch_from(&result, now);
        assert_eq!(patch.description.as_deref(), Some("Wood-fired cooking"));
        assert_eq!(patch.atmosphere.as_deref(), Some("Relaxed"));
        assert_eq!(patch.price_range.as_deref(), Some("$$$$"));
        assert_eq!(patch.cuisine_type, None);
        assert_eq!(patch.scraped_content.as_deref(), Some("Clean page text"));
        assert_eq!(patch.content_hash.as_deref(), Some("abc123"));
        assert_eq!(patch.scraped_at, now);
    }

    #[test]
    fn test_patch_carries_menu_and_images() {
        let mut result = ExtractionResult::new(
            "https://example.com",
            "text".to_string(),
            "h".to_string(),
            FetchMethod::Static,
        );
        result.menu = Some(Menu {
            sections: vec![MenuSection {
                section: "Desserts".to_string(),
                items: vec![MenuItem {
                    name: "Tarte Tatin".to_string(),
                    ..Default::default()
                }],
            }],
        });
        result.images = vec![ImageClassification {
            url: "https://example.com/room.jpg".to_string(),
            category: ImageCategory::SceneryAmbiance,
            category_confidence: 0.9,
            labels: vec!["dining room".to_string()],
            description: None,
            description_confidence: 0.1,
        }];

        let patch = patch_from(&result, Utc::now());
        assert_eq!(patch.menu.as_ref().map(Menu::item_count), Some(1));
        assert_eq!(patch.images.len(), 1);

        result.menu = Some(Menu::default());
        assert!(patch_from(&result, Utc::now()).menu.is_none());
    }

    #[test]
    fn test_unparseable_price_is_dropped() {
        let mut result = ExtractionResult::new(
            "https://example.com",
            String::new(),
            String::new(),
            FetchMethod::Browser,
        );
        result.summary = Some(RestaurantSummary {
            price_range: Some("moderate".to_string()),
            ..Default::default()
        });
        assert_eq!(patch_from(&result, Utc::now()).price_range, None);
    }
}
