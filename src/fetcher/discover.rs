//! Sub-page and image discovery on a fetched home page.

use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

/// Link text or path fragments that suggest a page worth reading.
const RELEVANT_KEYWORDS: &[&str] = &[
    "menu", "carte", "speisekarte", "brunch", "lunch", "dinner", "tasting", "wine", "cocktail",
    "drink", "dessert", "beverage", "food", "courses", "prix fixe", "set menu", "about",
    "story", "chef", "philosophy", "contact", "hours", "visit", "location", "reservation",
];

/// Sections never worth the request.
const IRRELEVANT_SECTIONS: &[&str] = &[
    "faq", "career", "gallery", "event", "wedding", "spa", "hotel", "press", "media",
    "newsletter", "login", "cart",
];

/// Image URLs that are almost never food or dining room photos.
const IMAGE_NOISE: &[&str] = &[
    "logo", "icon", "favicon", "avatar", "sprite", "social", "facebook", "instagram", "twitter",
    "tracking", "pixel", "badge", "spinner", "placeholder",
];

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredImage {
    pub url: String,
    pub alt: Option<String>,
}

/// Resolve an href against the page, rejecting non-navigational links.
fn resolve(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Same-origin links that look like menu, about or contact pages.
pub fn discover_subpages(html: &str, page_url: &str, max: usize) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(base.as_str().trim_end_matches('/').to_string());
    let mut links = Vec::new();

    for element in document.select(&selector) {
        if links.len() >= max {
            break;
        }
        let Some(url) = element.value().attr("href").and_then(|h| resolve(&base, h)) else {
            continue;
        };
        if url.origin() != base.origin() {
            continue;
        }

        let path = url.path().to_lowercase();
        let text = element.text().collect::<String>().to_lowercase();

        if IRRELEVANT_SECTIONS
            .iter()
            .any(|bad| path.contains(bad) || text.contains(bad))
        {
            continue;
        }
        if !RELEVANT_KEYWORDS
            .iter()
            .any(|kw| path.contains(kw) || text.contains(kw))
        {
            continue;
        }

        let key = url.as_str().trim_end_matches('/').to_string();
        if seen.insert(key) {
            links.push(url.to_string());
        }
    }

    links
}

/// Content images on the page, logos and tracking pixels excluded.
pub fn discover_images(html: &str, page_url: &str, max: usize) -> Vec<DiscoveredImage> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("img") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut seen: HashSet<String> = HashSet::new();
    let mut images = Vec::new();

    for element in document.select(&selector) {
        if images.len() >= max {
            break;
        }
        let attrs = element.value();
        let src = attrs
            .attr("src")
            .or_else(|| attrs.attr("data-src"))
            .or_else(|| attrs.attr("data-lazy-src"));
        let Some(url) = src.and_then(|s| resolve(&base, s)) else {
            continue;
        };

        let path = url.path().to_lowercase();
        if !IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            continue;
        }
        let lowered = url.as_str().to_lowercase();
        if IMAGE_NOISE.iter().any(|noise| lowered.contains(noise)) {
            continue;
        }
        if matches!(attrs.attr("width"), Some("1") | Some("0")) {
            continue;
        }

        if seen.insert(url.to_string()) {
            let alt = attrs
                .attr("alt")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string);
            images.push(DiscoveredImage {
                url: url.to_string(),
                alt,
            });
        }
    }

    images
}
