//! Deterministic parsers for values the analysis service returns as free
//! text, and for seed data.

use std::sync::OnceLock;

use regex::Regex;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// Normalize a price indication to a `$` tier.
///
/// Counts currency symbols: 1 to 3 map to the same number of `$`, 4 or more
/// to `$$$$`. No symbols means unknown.
pub fn parse_price_tier(raw: &str) -> Option<String> {
    let count = raw.chars().filter(|c| CURRENCY_SYMBOLS.contains(c)).count();
    match count {
        0 => None,
        n => Some("$".repeat(n.min(4))),
    }
}

/// Star count from an award string such as `"2 Stars"` or `3 Star MICHELIN`.
pub fn parse_michelin_stars(raw: &str) -> u8 {
    let cleaned = raw.to_lowercase().replace(['"', '\''], "");
    if cleaned.contains("3 star") {
        3
    } else if cleaned.contains("2 star") {
        2
    } else if cleaned.contains("1 star") {
        1
    } else {
        0
    }
}

/// Split `"City, Region, Country"` into (city, country).
pub fn parse_location(raw: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    match parts.as_slice() {
        [] => (None, None),
        [only] => (Some(only.to_string()), None),
        [first, .., last] => (Some(first.to_string()), Some(last.to_string())),
    }
}

const COUNTRY_TIMEZONES: &[(&str, &str)] = &[
    ("france", "Europe/Paris"),
    ("italy", "Europe/Rome"),
    ("spain", "Europe/Madrid"),
    ("united kingdom", "Europe/London"),
    ("uk", "Europe/London"),
    ("germany", "Europe/Berlin"),
    ("japan", "Asia/Tokyo"),
    ("singapore", "Asia/Singapore"),
    ("australia", "Australia/Sydney"),
    ("united states", "America/New_York"),
    ("usa", "America/New_York"),
    ("canada", "America/Toronto"),
    ("mexico", "America/Mexico_City"),
    ("argentina", "America/Argentina/Buenos_Aires"),
    ("brazil", "America/Sao_Paulo"),
    ("chile", "America/Santiago"),
    ("peru", "America/Lima"),
    ("india", "Asia/Kolkata"),
    ("china", "Asia/Shanghai"),
    ("south korea", "Asia/Seoul"),
    ("thailand", "Asia/Bangkok"),
    ("philippines", "Asia/Manila"),
    ("indonesia", "Asia/Jakarta"),
    ("malaysia", "Asia/Kuala_Lumpur"),
    ("vietnam", "Asia/Ho_Chi_Minh"),
    ("south africa", "Africa/Johannesburg"),
    ("egypt", "Africa/Cairo"),
    ("morocco", "Africa/Casablanca"),
    ("turkey", "Europe/Istanbul"),
    ("russia", "Europe/Moscow"),
    ("israel", "Asia/Jerusalem"),
    ("uae", "Asia/Dubai"),
    ("lebanon", "Asia/Beirut"),
    ("jordan", "Asia/Amman"),
];

/// Primary IANA timezone for a country name. Unknown countries give None.
pub fn timezone_for_country(country: &str) -> Option<&'static str> {
    let key = country.trim().to_lowercase();
    COUNTRY_TIMEZONES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, zone)| *zone)
}

fn phone_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\+?\(?\d[\d\s().\-]{6,}\d").ok())
        .as_ref()
}

/// First phone-number-looking run in the text.
pub fn extract_phone(text: &str) -> Option<String> {
    phone_regex()?
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .find(|candidate| {
            let digits = candidate.chars().filter(char::is_ascii_digit).count();
            // Years, prices and postcodes are too short; long runs are ids.
            (8..=15).contains(&digits) && !looks_like_date_range(candidate)
        })
        .map(str::to_string)
}

fn looks_like_date_range(s: &str) -> bool {
    let groups: Vec<&str> = s
        .split(|c: char| !c.is_ascii_digit())
        .filter(|g| !g.is_empty())
        .collect();
    groups.len() == 2 && groups.iter().all(|g| g.len() == 4)
}
