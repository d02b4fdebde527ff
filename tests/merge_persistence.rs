//! Field merge rules applied through the record store.

use chrono::Utc;
use tablescout::models::{EnrichmentPatch, NewRestaurant};
use tablescout::repository::RestaurantRepository;
use tempfile::tempdir;

fn seeded(dir: &std::path::Path) -> (RestaurantRepository, i64) {
    let repo = RestaurantRepository::new(&dir.join("tablescout.db")).unwrap();
    let id = repo
        .upsert_seed(&NewRestaurant::new("Le Clarence", "Paris", "France").with_website("https://le-clarence.paris"))
        .unwrap();
    (repo, id)
}

fn patch() -> EnrichmentPatch {
    EnrichmentPatch::empty(Utc::now())
}

#[test]
fn description_only_grows() {
    let dir = tempdir().unwrap();
    let (repo, id) = seeded(dir.path());

    let mut p = patch();
    p.description = Some("d".repeat(40));
    repo.apply_enrichment(id, &p, false).unwrap();

    p.description = Some("l".repeat(120));
    assert_eq!(
        repo.apply_enrichment(id, &p, false).unwrap().description,
        Some("l".repeat(120))
    );

    p.description = Some("s".repeat(30));
    repo.apply_enrichment(id, &p, false).unwrap();
    assert_eq!(repo.get(id).unwrap().unwrap().description, Some("l".repeat(120)));
}

#[test]
fn set_if_empty_fields_survive_repeated_merges() {
    let dir = tempdir().unwrap();
    let (repo, id) = seeded(dir.path());

    let mut first = patch();
    first.cuisine_type = Some("Classic French".to_string());
    first.phone = Some("+33 1 82 82 10 10".to_string());
    first.opening_hours = Some("Tue-Sat".to_string());
    repo.apply_enrichment(id, &first, false).unwrap();
    let after_one = repo.get(id).unwrap().unwrap();

    let mut second = patch();
    second.cuisine_type = Some("Seafood".to_string());
    second.phone = Some("+33 0 00 00 00 00".to_string());
    second.opening_hours = Some("Daily".to_string());
    repo.apply_enrichment(id, &second, false).unwrap();
    repo.apply_enrichment(id, &second, false).unwrap();
    let after_three = repo.get(id).unwrap().unwrap();

    assert_eq!(after_three.cuisine_type, after_one.cuisine_type);
    assert_eq!(after_three.phone, after_one.phone);
    assert_eq!(after_three.opening_hours, after_one.opening_hours);
}

#[test]
fn scraped_content_and_hash_follow_latest_attempt() {
    let dir = tempdir().unwrap();
    let (repo, id) = seeded(dir.path());

    let mut p = patch();
    p.scraped_content = Some("first page".to_string());
    p.content_hash = Some("aaa".to_string());
    repo.apply_enrichment(id, &p, false).unwrap();

    let mut later = EnrichmentPatch::empty(Utc::now() + chrono::Duration::seconds(5));
    later.scraped_content = Some("second page".to_string());
    later.content_hash = Some("bbb".to_string());
    let stored = repo.apply_enrichment(id, &later, false).unwrap();

    assert_eq!(stored.scraped_content.as_deref(), Some("second page"));
    assert_eq!(stored.content_hash.as_deref(), Some("bbb"));
    assert_eq!(stored.scraped_at, Some(later.scraped_at));
    assert_eq!(repo.counts().unwrap(), (1, 1));
}

#[test]
fn concurrent_merges_on_one_record_keep_both_fields() {
    let dir = tempdir().unwrap();
    let (repo, id) = seeded(dir.path());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let repo = repo.clone();
            std::thread::spawn(move || {
                let mut p = EnrichmentPatch::empty(Utc::now());
                if i % 2 == 0 {
                    p.cuisine_type = Some("French".to_string());
                } else {
                    p.phone = Some("+33 1 82 82 10 10".to_string());
                }
                repo.apply_enrichment(id, &p, false).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stored = repo.get(id).unwrap().unwrap();
    assert_eq!(stored.cuisine_type.as_deref(), Some("French"));
    assert_eq!(stored.phone.as_deref(), Some("+33 1 82 82 10 10"));
}

#[test]
fn reseeding_does_not_undo_enrichment() {
    let dir = tempdir().unwrap();
    let (repo, id) = seeded(dir.path());

    let mut p = patch();
    p.price_range = Some("$$$$".to_string());
    repo.apply_enrichment(id, &p, false).unwrap();

    let mut reseed = NewRestaurant::new("Le Clarence", "Paris", "France");
    reseed.price_range = Some("$$".to_string());
    reseed.michelin_stars = 2;
    assert_eq!(repo.upsert_seed(&reseed).unwrap(), id);

    let stored = repo.get(id).unwrap().unwrap();
    assert_eq!(stored.price_range.as_deref(), Some("$$$$"));
    assert_eq!(stored.michelin_stars, 2);
    assert_eq!(stored.website.as_deref(), Some("https://le-clarence.paris"));
}
