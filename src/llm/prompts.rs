//! Prompt templates.
//!
//! Templates use `{placeholder}` substitution. System prompts carry the
//! output contract; user prompts carry the page content.

/// Characters of page text sent for translation.
pub const TRANSLATION_CHARS: usize = 4000;
/// Characters of page text sent for the summary.
pub const SUMMARY_CHARS: usize = 3000;
/// Characters of page text sent for menu structuring.
pub const MENU_CHARS: usize = 6000;

pub const TRANSLATION_SYSTEM: &str =
    "You are a professional translator fluent in all languages. Translate faithfully and return only the translated text.";

/// Placeholders: {source}, {target}, {content}
pub const TRANSLATION_PROMPT: &str =
    "Please translate the following text from {source} to {target}:\n\n{content}";

pub const SUMMARY_SYSTEM: &str = r#"You are a helpful assistant that builds concise, factual restaurant profiles from raw website text.

Only use information present in the source text. Respond with a single JSON object and nothing else:
{
  "description": "2-4 sentence overview of the restaurant",
  "cuisine": "cuisine type, e.g. \"Modern French\"",
  "ambiance": "atmosphere, service style or setting",
  "price_range": "price indication as written on the site, e.g. \"€€€\" or \"$$\"",
  "phone": "phone number if present",
  "opening_hours": "opening hours if present",
  "chef": "head chef and background if present",
  "philosophy": "culinary philosophy or sourcing if present",
  "highlights": ["notable dishes or features"],
  "confidence": 0.0
}

Use null for anything the text does not mention. "confidence" is your confidence from 0.0 to 1.0 that the text describes a single restaurant and that the fields are accurate."#;

/// Placeholders: {url}, {content}
pub const SUMMARY_PROMPT: &str = "Website: {url}\n\n{content}";

pub const MENU_SYSTEM: &str = r#"You are a data extraction assistant.

Extract structured menu data from raw text scraped from a restaurant website. Organize the menu into sections such as "Starters", "Mains", "Tasting Menu", "Wine", "Drinks" or "Desserts".

Respond with a single JSON object and nothing else:
{"sections": [{"section": "Starters", "items": [{"name": "Seared Scallops", "price": "$18", "description": "With citrus butter"}]}]}

Only include actual menu items. Skip promotional or non-menu content. Return {"sections": []} when there is no menu."#;

/// Placeholders: {content}
pub const MENU_PROMPT: &str = "{content}";

pub const IMAGE_SYSTEM: &str = r#"You classify photos from restaurant websites using the image URL, its alt text and the page it appears on.

Respond with a single JSON object and nothing else:
{
  "category": "scenery_ambiance" or "menu_item",
  "category_confidence": 0.0,
  "labels": ["short descriptive labels"],
  "description": "one sentence describing the likely content",
  "description_confidence": 0.0
}

Use "scenery_ambiance" for dining rooms, terraces, views and interiors; "menu_item" for dishes and drinks. Confidences are from 0.0 to 1.0."#;

/// Placeholders: {image_url}, {alt}, {page_url}
pub const IMAGE_PROMPT: &str = "Image URL: {image_url}\nAlt text: {alt}\nFound on: {page_url}";

/// Fill a template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_summary_prompt() {
        let prompt = render(
            SUMMARY_PROMPT,
            &[("url", "https://example.com"), ("content", "Seasonal menu")],
        );
        assert_eq!(prompt, "Website: https://example.com\n\nSeasonal menu");
    }

    #[test]
    fn test_system_prompts_name_every_field() {
        for field in [
            "description", "cuisine", "ambiance", "price_range", "phone", "opening_hours",
            "chef", "philosophy", "highlights", "confidence",
        ] {
            assert!(SUMMARY_SYSTEM.contains(&format!("\"{}\"", field)), "{}", field);
        }
        assert!(IMAGE_SYSTEM.contains("scenery_ambiance"));
        assert!(MENU_SYSTEM.contains("\"sections\""));
    }
}
