//! Markdown profile of a restaurant record, for operators.

use std::fmt::Write;

use crate::models::{ImageCategory, ImageClassification, Menu, Restaurant};

const CONTENT_PREVIEW_CHARS: usize = 600;

/// Render a record, its menu and its classified images as Markdown.
///
/// Sections with nothing stored are left out rather than shown empty.
pub fn render(restaurant: &Restaurant, menu: &Menu, images: &[ImageClassification]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# {}", restaurant.name);
    let _ = writeln!(out);

    let location = [restaurant.city.as_str(), restaurant.country.as_str()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if !location.is_empty() {
        let _ = writeln!(out, "_{}_", location);
        let _ = writeln!(out);
    }

    let stars = stars(restaurant.michelin_stars);
    let facts = [
        ("Michelin", (!stars.is_empty()).then_some(stars.as_str())),
        ("Cuisine", restaurant.cuisine_type.as_deref()),
        ("Price", restaurant.price_range.as_deref()),
        ("Atmosphere", restaurant.atmosphere.as_deref()),
        ("Phone", restaurant.phone.as_deref()),
        ("Hours", restaurant.opening_hours.as_deref()),
        ("Address", restaurant.address.as_deref()),
        ("Timezone", restaurant.timezone.as_deref()),
        ("Website", restaurant.target_url()),
    ];
    let mut any = false;
    for (label, value) in facts {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            let _ = writeln!(out, "- **{}:** {}", label, value);
            any = true;
        }
    }
    if any {
        let _ = writeln!(out);
    }

    if let Some(description) = restaurant
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        let _ = writeln!(out, "## About");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", description);
        let _ = writeln!(out);
    }

    if !menu.is_empty() {
        let _ = writeln!(out, "## Menu");
        let _ = writeln!(out);
        for section in menu.sections.iter().filter(|s| !s.items.is_empty()) {
            let _ = writeln!(out, "### {}", section.section);
            let _ = writeln!(out);
            for item in &section.items {
                let _ = write!(out, "- {}", item.name);
                if let Some(price) = item.price.as_deref().filter(|p| !p.is_empty()) {
                    let _ = write!(out, " ({})", price);
                }
                if let Some(description) = item.description.as_deref().filter(|d| !d.is_empty()) {
                    let _ = write!(out, ": {}", description);
                }
                let _ = writeln!(out);
            }
            let _ = writeln!(out);
        }
    }

    if !images.is_empty() {
        let _ = writeln!(out, "## Images");
        let _ = writeln!(out);
        for category in [
            ImageCategory::MenuItem,
            ImageCategory::SceneryAmbiance,
            ImageCategory::Uncategorized,
        ] {
            for image in images.iter().filter(|i| i.category == category) {
                let _ = write!(out, "- [{}]({})", category.as_str(), image.url);
                if let Some(description) = image.description.as_deref() {
                    let _ = write!(out, " {}", description);
                }
                if !image.labels.is_empty() {
                    let _ = write!(out, " _({})_", image.labels.join(", "));
                }
                let _ = writeln!(out);
            }
        }
        let _ = writeln!(out);
    }

    if let Some(content) = restaurant
        .scraped_content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        let _ = writeln!(out, "## Website excerpt");
        let _ = writeln!(out);
        for line in preview(content).lines() {
            let _ = writeln!(out, "> {}", line);
        }
        let _ = writeln!(out);
    }

    match restaurant.scraped_at {
        Some(at) => {
            let _ = writeln!(out, "_Enriched {}_", at.format("%Y-%m-%d %H:%M UTC"));
        }
        None => {
            let _ = writeln!(out, "_Not enriched yet_");
        }
    }

    out
}

fn stars(count: u8) -> String {
    match count {
        0 => String::new(),
        1 => "1 star".to_string(),
        n => format!("{} stars", n.min(3)),
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= CONTENT_PREVIEW_CHARS {
        return content.to_string();
    }
    let cut: String = content.chars().take(CONTENT_PREVIEW_CHARS).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MenuItem, MenuSection};
    use chrono::{TimeZone, Utc};

    fn restaurant() -> Restaurant {
        Restaurant {
            id: 7,
            name: "Noma".to_string(),
            city: "Copenhagen".to_string(),
            country: "Denmark".to_string(),
            address: None,
            latitude: None,
            longitude: None,
            website: Some("https://noma.dk".to_string()),
            email: None,
            michelin_stars: 3,
            timezone: None,
            description: None,
            cuisine_type: None,
            price_range: None,
            atmosphere: None,
            phone: None,
            opening_hours: None,
            original_url: None,
            scraped_content: None,
            content_hash: None,
            scraped_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_unenriched_profile_is_minimal() {
        let md = render(&restaurant(), &Menu::default(), &[]);
        assert!(md.starts_with("# Noma\n"));
        assert!(md.contains("_Copenhagen, Denmark_"));
        assert!(md.contains("- **Michelin:** 3 stars"));
        assert!(md.contains("- **Website:** https://noma.dk"));
        assert!(!md.contains("## About"));
        assert!(md.ends_with("_Not enriched yet_\n"));
    }

    #[test]
    fn test_enriched_profile_lists_fields() {
        let mut r = restaurant();
        r.michelin_stars = 0;
        r.cuisine_type = Some("New Nordic".to_string());
        r.price_range = Some("$$$$".to_string());
        r.description = Some("Seasonal tasting menus.".to_string());
        r.scraped_content = Some("line one\nline two".to_string());
        r.scraped_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap());

        let md = render(&r, &Menu::default(), &[]);
        assert!(!md.contains("Michelin"));
        assert!(md.contains("- **Cuisine:** New Nordic"));
        assert!(md.contains("- **Price:** $$$$"));
        assert!(md.contains("## About\n\nSeasonal tasting menus."));
        assert!(md.contains("> line one\n> line two"));
        assert!(md.contains("_Enriched 2024-05-01 12:30 UTC_"));
    }

    #[test]
    fn test_menu_and_images_sections() {
        let mut r = restaurant();
        r.timezone = Some("Europe/Copenhagen".to_string());
        let menu = Menu {
            sections: vec![MenuSection {
                section: "Winter".to_string(),
                items: vec![MenuItem {
                    name: "Reindeer moss".to_string(),
                    price: None,
                    description: Some("fried, with cep".to_string()),
                }],
            }],
        };
        let images = vec![ImageClassification {
            url: "https://noma.dk/room.jpg".to_string(),
            category: ImageCategory::SceneryAmbiance,
            category_confidence: 0.9,
            labels: vec!["dining room".to_string(), "wood".to_string()],
            description: Some("Long wooden tables".to_string()),
            description_confidence: 0.8,
        }];

        let md = render(&r, &menu, &images);
        assert!(md.contains("- **Timezone:** Europe/Copenhagen"));
        assert!(md.contains("## Menu\n\n### Winter\n\n- Reindeer moss: fried, with cep\n"));
        assert!(md.contains(
            "- [scenery_ambiance](https://noma.dk/room.jpg) Long wooden tables _(dining room, wood)_"
        ));
    }

    #[test]
    fn test_long_content_is_cut() {
        let mut r = restaurant();
        r.scraped_content = Some("x".repeat(2000));
        let md = render(&r, &Menu::default(), &[]);
        assert!(md.contains('…'));
        assert!(md.len() < 1200);
    }
}
