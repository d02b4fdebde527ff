//! Quality gate for extraction results.

use crate::extraction::{mean_confidence, parse_price_tier};
use crate::models::ExtractionResult;

/// Scores at or below this are rejected and routed to the backlog.
pub const ACCEPT_THRESHOLD: f64 = 0.2;

/// Number of enrichable fields counted for completeness.
const COMPLETENESS_FIELDS: f64 = 7.0;

const RESTAURANT_VOCABULARY: &[&str] = &[
    "menu",
    "dish",
    "dishes",
    "cuisine",
    "chef",
    "restaurant",
    "dining",
    "reservation",
    "reservations",
    "tasting",
    "wine",
    "kitchen",
    "lunch",
    "dinner",
    "seasonal",
];

/// Score content alone: length and vocabulary.
pub fn content_score(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    if words.len() < 10 {
        return 0.1;
    }

    let mut score: f64 = 0.3;
    let has_vocabulary = words.iter().any(|w| {
        let w = w
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        RESTAURANT_VOCABULARY.contains(&w.as_str())
    });
    if has_vocabulary {
        score += 0.4;
    }
    if (50..=5000).contains(&words.len()) {
        score += 0.3;
    }
    score.min(1.0)
}

/// Share of the seven enrichable fields the attempt produced.
pub fn completeness(result: &ExtractionResult) -> f64 {
    let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

    let mut count = 0;
    if let Some(summary) = &result.summary {
        count += [
            &summary.description,
            &summary.cuisine,
            &summary.ambiance,
            &summary.phone,
            &summary.opening_hours,
        ]
        .into_iter()
        .filter(|v| filled(*v))
        .count();
        if summary
            .price_range
            .as_deref()
            .and_then(parse_price_tier)
            .is_some()
        {
            count += 1;
        }
    }
    if result.menu.as_ref().is_some_and(|m| !m.is_empty()) {
        count += 1;
    }
    count as f64 / COMPLETENESS_FIELDS
}

/// Confidence reported by the service, if any.
fn confidence(result: &ExtractionResult) -> Option<f64> {
    let summary = result.summary.as_ref().and_then(|s| s.confidence);
    let images = mean_confidence(&result.images);
    match (summary, images) {
        (Some(s), Some(i)) => Some((s + i) / 2.0),
        (Some(c), None) | (None, Some(c)) => Some(c),
        (None, None) => None,
    }
}

/// Overall quality in [0, 1]. Empty text scores 0.
pub fn score(result: &ExtractionResult) -> f64 {
    let content = content_score(result.analysis_text());
    if content == 0.0 {
        return 0.0;
    }
    let complete = completeness(result);

    let total = match confidence(result) {
        Some(c) => 0.5 * content + 0.3 * complete + 0.2 * c.clamp(0.0, 1.0),
        None => 0.6 * content + 0.4 * complete,
    };
    total.clamp(0.0, 1.0)
}

/// Whether a score passes the gate.
pub fn is_acceptable(score: f64) -> bool {
    score > ACCEPT_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchMethod, Menu, MenuItem, MenuSection, RestaurantSummary};

    fn result(content: &str) -> ExtractionResult {
        ExtractionResult::new(
            "https://example.com",
            content.to_string(),
            String::new(),
            FetchMethod::Static,
        )
    }

    fn words(n: usize, word: &str) -> String {
        vec![word; n].join(" ")
    }

    #[test]
    fn test_content_score_tiers() {
        assert_eq!(content_score(""), 0.0);
        assert_eq!(content_score("   \n "), 0.0);
        assert_eq!(content_score("too short to count"), 0.1);
        assert!((content_score(&words(12, "lorem")) - 0.3).abs() < 1e-9);
        assert!((content_score(&format!("{} chef", words(11, "lorem"))) - 0.7).abs() < 1e-9);
        assert!((content_score(&format!("{} Menu.", words(60, "lorem"))) - 1.0).abs() < 1e-9);
        assert!((content_score(&words(6000, "lorem")) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_empty_text_scores_zero() {
        let mut r = result("");
        r.summary = Some(RestaurantSummary {
            description: Some("x".to_string()),
            confidence: Some(1.0),
            ..Default::default()
        });
        assert_eq!(score(&r), 0.0);
        assert!(!is_acceptable(score(&r)));
    }

    #[test]
    fn test_completeness_counts_fields() {
        let mut r = result("text");
        r.summary = Some(RestaurantSummary {
            description: Some("Bistro".to_string()),
            cuisine: Some("French".to_string()),
            price_range: Some("expensive".to_string()),
            phone: Some(" ".to_string()),
            ..Default::default()
        });
        assert!((completeness(&r) - 2.0 / 7.0).abs() < 1e-9);

        r.menu = Some(Menu {
            sections: vec![MenuSection {
                section: "Mains".to_string(),
                items: vec![MenuItem {
                    name: "Duck".to_string(),
                    ..Default::default()
                }],
            }],
        });
        if let Some(s) = r.summary.as_mut() {
            s.price_range = Some("€€".to_string());
        }
        assert!((completeness(&r) - 4.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_with_and_without_confidence() {
        let text = format!("{} restaurant", words(60, "lorem"));
        let mut r = result(&text);
        r.summary = Some(RestaurantSummary {
            description: Some("Bistro".to_string()),
            ..Default::default()
        });
        let expected = 0.6 * 1.0 + 0.4 * (1.0 / 7.0);
        assert!((score(&r) - expected).abs() < 1e-9);

        if let Some(s) = r.summary.as_mut() {
            s.confidence = Some(0.5);
        }
        let expected = 0.5 * 1.0 + 0.3 * (1.0 / 7.0) + 0.2 * 0.5;
        assert!((score(&r) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(!is_acceptable(ACCEPT_THRESHOLD));
        assert!(is_acceptable(ACCEPT_THRESHOLD + 0.01));
        // Short text with nothing extracted lands below the gate.
        assert!(!is_acceptable(score(&result("Under construction"))));
    }
}
