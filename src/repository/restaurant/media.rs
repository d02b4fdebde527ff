//! Menus and image classifications attached to a restaurant record.
//!
//! Writers take the caller's connection so they run inside the same
//! transaction as the record merge.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{ImageCategory, ImageClassification, Menu, MenuItem, MenuSection};
use crate::repository::{format_datetime, Result};

const SECTION_NAME_CHARS: usize = 100;
const ITEM_NAME_CHARS: usize = 200;
const ITEM_DESCRIPTION_CHARS: usize = 500;
const ITEM_PRICE_CHARS: usize = 20;

fn clip(s: &str, max: usize) -> String {
    s.trim().chars().take(max).collect()
}

fn clip_opt(s: Option<&str>, max: usize) -> Option<String> {
    s.map(|s| clip(s, max)).filter(|s| !s.is_empty())
}

/// Drop the stored menu and write `menu` in its place.
pub(super) fn replace_menu(conn: &Connection, restaurant_id: i64, menu: &Menu) -> Result<usize> {
    conn.execute(
        "DELETE FROM menu_sections WHERE restaurant_id = ?",
        params![restaurant_id],
    )?;

    let mut items = 0;
    for (position, section) in menu.sections.iter().enumerate() {
        let name = match clip(&section.section, SECTION_NAME_CHARS) {
            n if n.is_empty() => "Menu".to_string(),
            n => n,
        };
        conn.execute(
            "INSERT INTO menu_sections (restaurant_id, name, position) VALUES (?, ?, ?)",
            params![restaurant_id, name, position as i64],
        )?;
        let section_id = conn.last_insert_rowid();

        for (item_position, item) in section.items.iter().enumerate() {
            let item_name = clip(&item.name, ITEM_NAME_CHARS);
            if item_name.is_empty() {
                continue;
            }
            conn.execute(
                r#"
                INSERT INTO menu_items (section_id, name, price, description, position)
                VALUES (?, ?, ?, ?, ?)
                "#,
                params![
                    section_id,
                    item_name,
                    clip_opt(item.price.as_deref(), ITEM_PRICE_CHARS),
                    clip_opt(item.description.as_deref(), ITEM_DESCRIPTION_CHARS),
                    item_position as i64,
                ],
            )?;
            items += 1;
        }
    }
    Ok(items)
}

/// Insert or refresh image classifications, keyed by URL.
pub(super) fn upsert_images(
    conn: &Connection,
    restaurant_id: i64,
    images: &[ImageClassification],
    classified_at: &DateTime<Utc>,
) -> Result<usize> {
    let at = format_datetime(classified_at);
    for image in images {
        conn.execute(
            r#"
            INSERT INTO restaurant_images (
                restaurant_id, url, category, category_confidence, labels,
                description, description_confidence, classified_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(restaurant_id, url) DO UPDATE SET
                category = excluded.category,
                category_confidence = excluded.category_confidence,
                labels = excluded.labels,
                description = COALESCE(excluded.description, restaurant_images.description),
                description_confidence = excluded.description_confidence,
                classified_at = excluded.classified_at
            "#,
            params![
                restaurant_id,
                image.url,
                image.category.as_str(),
                image.category_confidence,
                serde_json::to_string(&image.labels)?,
                image.description.as_deref().filter(|d| !d.trim().is_empty()),
                image.description_confidence,
                at,
            ],
        )?;
    }
    Ok(images.len())
}

pub(super) fn load_menu(conn: &Connection, restaurant_id: i64) -> Result<Menu> {
    let mut sections_stmt = conn.prepare(
        "SELECT id, name FROM menu_sections WHERE restaurant_id = ? ORDER BY position ASC, id ASC",
    )?;
    let sections = sections_stmt
        .query_map(params![restaurant_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut items_stmt = conn.prepare(
        r#"
        SELECT name, price, description FROM menu_items
        WHERE section_id = ?
        ORDER BY position ASC, id ASC
        "#,
    )?;

    let mut menu = Menu::default();
    for (section_id, name) in sections {
        let items = items_stmt
            .query_map(params![section_id], |row| {
                Ok(MenuItem {
                    name: row.get(0)?,
                    price: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        menu.sections.push(MenuSection {
            section: name,
            items,
        });
    }
    Ok(menu)
}

pub(super) fn load_images(conn: &Connection, restaurant_id: i64) -> Result<Vec<ImageClassification>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT url, category, category_confidence, labels, description, description_confidence
        FROM restaurant_images
        WHERE restaurant_id = ?
        ORDER BY url ASC
        "#,
    )?;
    let images = stmt
        .query_map(params![restaurant_id], |row| {
            let labels: String = row.get(3)?;
            Ok(ImageClassification {
                url: row.get(0)?,
                category: ImageCategory::from_str(&row.get::<_, String>(1)?),
                category_confidence: row.get(2)?,
                labels: serde_json::from_str(&labels).unwrap_or_default(),
                description: row.get(4)?,
                description_confidence: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::super::RestaurantRepository;
    use crate::models::{
        EnrichmentPatch, ImageCategory, ImageClassification, Menu, MenuItem, MenuSection,
        NewRestaurant,
    };
    use chrono::Utc;
    use tempfile::tempdir;

    fn menu(section: &str, dishes: &[&str]) -> Menu {
        Menu {
            sections: vec![MenuSection {
                section: section.to_string(),
                items: dishes
                    .iter()
                    .map(|d| MenuItem {
                        name: d.to_string(),
                        price: Some("€24".to_string()),
                        description: None,
                    })
                    .collect(),
            }],
        }
    }

    fn image(url: &str, category: ImageCategory, labels: &[&str]) -> ImageClassification {
        ImageClassification {
            url: url.to_string(),
            category,
            category_confidence: 0.9,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            description: Some("A plated dish".to_string()),
            description_confidence: 0.8,
        }
    }

    fn setup() -> (tempfile::TempDir, RestaurantRepository, i64) {
        let dir = tempdir().unwrap();
        let repo = RestaurantRepository::new(&dir.path().join("t.db")).unwrap();
        let id = repo
            .upsert_seed(&NewRestaurant::new("Frenchie", "Paris", "France"))
            .unwrap();
        (dir, repo, id)
    }

    #[test]
    fn test_menu_replaced_only_by_non_empty_menu() {
        let (_dir, repo, id) = setup();

        let mut patch = EnrichmentPatch::empty(Utc::now());
        patch.menu = Some(menu("Starters", &["Burrata", "Oysters"]));
        repo.apply_enrichment(id, &patch, false).unwrap();

        patch.menu = Some(menu("Mains", &["Duck"]));
        repo.apply_enrichment(id, &patch, false).unwrap();
        let stored = repo.menu(id).unwrap();
        assert_eq!(stored.sections.len(), 1);
        assert_eq!(stored.sections[0].section, "Mains");
        assert_eq!(stored.sections[0].items[0].name, "Duck");
        assert_eq!(stored.sections[0].items[0].price.as_deref(), Some("€24"));

        patch.menu = Some(Menu::default());
        repo.apply_enrichment(id, &patch, false).unwrap();
        assert_eq!(repo.menu(id).unwrap().item_count(), 1);
    }

    #[test]
    fn test_images_upserted_by_url() {
        let (_dir, repo, id) = setup();

        let mut patch = EnrichmentPatch::empty(Utc::now());
        patch.images = vec![
            image("https://frenchie.test/a.jpg", ImageCategory::Uncategorized, &[]),
            image("https://frenchie.test/b.jpg", ImageCategory::SceneryAmbiance, &["room"]),
        ];
        repo.apply_enrichment(id, &patch, false).unwrap();

        patch.images = vec![image(
            "https://frenchie.test/a.jpg",
            ImageCategory::MenuItem,
            &["fish", "sauce"],
        )];
        repo.apply_enrichment(id, &patch, false).unwrap();

        let stored = repo.images(id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].category, ImageCategory::MenuItem);
        assert_eq!(stored[0].labels, vec!["fish", "sauce"]);
        assert_eq!(stored[1].category, ImageCategory::SceneryAmbiance);
    }

    #[test]
    fn test_long_menu_values_are_clipped() {
        let (_dir, repo, id) = setup();

        let mut long = menu(&"S".repeat(300), &[&"n".repeat(400)]);
        long.sections[0].items[0].price = Some("9".repeat(50));
        long.sections[0].items.push(MenuItem::default());

        let mut patch = EnrichmentPatch::empty(Utc::now());
        patch.menu = Some(long);
        repo.apply_enrichment(id, &patch, false).unwrap();

        let stored = repo.menu(id).unwrap();
        assert_eq!(stored.sections[0].section.chars().count(), 100);
        assert_eq!(stored.sections[0].items.len(), 1);
        assert_eq!(stored.sections[0].items[0].name.chars().count(), 200);
        assert_eq!(stored.sections[0].items[0].price.as_deref().map(str::len), Some(20));
    }
}
