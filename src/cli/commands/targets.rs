//! Restaurant record commands.

use console::style;

use crate::config::Settings;
use crate::extraction::{parse_location, parse_michelin_stars, parse_price_tier};
use crate::models::NewRestaurant;

use crate::cli::helpers::{open_restaurants, truncate};

/// Raw `targets add` arguments.
pub struct TargetInput {
    pub name: String,
    pub url: Option<String>,
    pub location: Option<String>,
    pub award: Option<String>,
    pub cuisine: Option<String>,
    pub price: Option<String>,
    pub phone: Option<String>,
}

impl TargetInput {
    fn into_seed(self) -> NewRestaurant {
        let (city, country) = self
            .location
            .as_deref()
            .map(parse_location)
            .unwrap_or((None, None));

        let mut seed = NewRestaurant::new(
            &self.name,
            city.as_deref().unwrap_or(""),
            country.as_deref().unwrap_or(""),
        );
        seed.website = self.url.filter(|u| !u.trim().is_empty());
        seed.michelin_stars = self.award.as_deref().map(parse_michelin_stars).unwrap_or(0);
        seed.price_range = self.price.as_deref().and_then(parse_price_tier);
        seed.cuisine_type = self.cuisine;
        seed.phone = self.phone;
        seed
    }
}

/// Add a record, or fill gaps on the one with the same name and location.
pub fn cmd_targets_add(settings: &Settings, input: TargetInput) -> anyhow::Result<()> {
    let repo = open_restaurants(settings)?;
    let seed = input.into_seed();
    let existed = repo
        .find_by_key(&seed.name, &seed.city, &seed.country)?
        .is_some();
    let id = repo.upsert_seed(&seed)?;

    println!(
        "{} {} {} (id {}) in {}",
        style("✓").green(),
        if existed { "Updated" } else { "Added" },
        seed.name,
        id,
        [seed.city.as_str(), seed.country.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", ")
    );
    if seed.website.is_none() {
        println!(
            "  {} No website; this record cannot be enriched",
            style("!").yellow()
        );
    }
    Ok(())
}

/// List records.
pub fn cmd_targets_list(settings: &Settings, limit: usize, pending: bool) -> anyhow::Result<()> {
    let repo = open_restaurants(settings)?;
    let records = if pending {
        repo.list_needing_enrichment(limit)?
    } else {
        repo.list(limit)?
    };
    let (total, enriched) = repo.counts()?;

    if records.is_empty() {
        println!("{} No records found", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Restaurants").bold());
    println!("{}", "-".repeat(80));
    println!(
        "{:<6} {:<28} {:<18} {:<5} {:<8} Website",
        "ID", "Name", "City", "Stars", "Enriched"
    );
    println!("{}", "-".repeat(80));

    for r in &records {
        let enriched_mark = if r.is_enriched() {
            style("yes").green()
        } else {
            style("no").dim()
        };
        println!(
            "{:<6} {:<28} {:<18} {:<5} {:<8} {}",
            r.id,
            truncate(&r.name, 27),
            truncate(&r.city, 17),
            r.michelin_stars,
            enriched_mark,
            truncate(r.target_url().unwrap_or("-"), 40)
        );
    }

    println!("\n{} of {} record(s) enriched", enriched, total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_from_raw_input() {
        let seed = TargetInput {
            name: " Mirazur ".to_string(),
            url: Some("https://www.mirazur.fr".to_string()),
            location: Some("Menton, Provence-Alpes-Côte d'Azur, France".to_string()),
            award: Some("3 Stars".to_string()),
            cuisine: None,
            price: Some("€€€€".to_string()),
            phone: None,
        }
        .into_seed();

        assert_eq!(seed.name, "Mirazur");
        assert_eq!(seed.city, "Menton");
        assert_eq!(seed.country, "France");
        assert_eq!(seed.michelin_stars, 3);
        assert_eq!(seed.price_range.as_deref(), Some("$$$$"));
    }

    #[test]
    fn test_blank_url_is_dropped() {
        let seed = TargetInput {
            name: "Nameless".to_string(),
            url: Some("  ".to_string()),
            location: None,
            award: None,
            cuisine: None,
            price: None,
            phone: None,
        }
        .into_seed();
        assert!(seed.website.is_none());
        assert_eq!(seed.michelin_stars, 0);
    }
}
