//! Per-attempt extraction values. These never hit the database directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How page content was retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    Static,
    Browser,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Browser => "browser",
        }
    }
}

/// Title, description and OpenGraph tags pulled from the page head.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `og:*` properties keyed without the prefix.
    pub open_graph: HashMap<String, String>,
}

/// Structured summary returned by the analysis service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestaurantSummary {
    pub description: Option<String>,
    pub cuisine: Option<String>,
    /// Atmosphere of the venue.
    pub ambiance: Option<String>,
    pub price_range: Option<String>,
    pub phone: Option<String>,
    pub opening_hours: Option<String>,
    pub chef: Option<String>,
    pub philosophy: Option<String>,
    pub highlights: Vec<String>,
    /// Self-reported confidence, 0.0 to 1.0.
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuItem {
    pub name: String,
    pub price: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuSection {
    pub section: String,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Menu {
    pub sections: Vec<MenuSection>,
}

impl Menu {
    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    SceneryAmbiance,
    MenuItem,
    #[default]
    Uncategorized,
}

impl ImageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SceneryAmbiance => "scenery_ambiance",
            Self::MenuItem => "menu_item",
            Self::Uncategorized => "uncategorized",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "scenery_ambiance" | "scenery" | "ambiance" => Self::SceneryAmbiance,
            "menu_item" | "dish" | "food" => Self::MenuItem,
            _ => Self::Uncategorized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageClassification {
    pub url: String,
    pub category: ImageCategory,
    pub category_confidence: f64,
    pub labels: Vec<String>,
    pub description: Option<String>,
    pub description_confidence: f64,
}

/// Everything one enrichment attempt produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub url: String,
    /// Cleaned text the analysis ran on (before translation).
    pub content: String,
    /// SHA-256 of the raw fetched page.
    pub content_hash: String,
    pub fetch_method: FetchMethod,
    pub language: Option<String>,
    pub translated_content: Option<String>,
    pub metadata: PageMetadata,
    pub summary: Option<RestaurantSummary>,
    pub menu: Option<Menu>,
    pub images: Vec<ImageClassification>,
    pub quality_score: f64,
    pub success: bool,
    /// Sub-task failures that degraded but did not abort the attempt.
    pub errors: Vec<String>,
}

impl ExtractionResult {
    pub fn new(url: &str, content: String, content_hash: String, fetch_method: FetchMethod) -> Self {
        Self {
            url: url.to_string(),
            content,
            content_hash,
            fetch_method,
            language: None,
            translated_content: None,
            metadata: PageMetadata::default(),
            summary: None,
            menu: None,
            images: Vec::new(),
            quality_score: 0.0,
            success: false,
            errors: Vec::new(),
        }
    }

    /// Text used for analysis: the translation when one exists.
    pub fn analysis_text(&self) -> &str {
        self.translated_content.as_deref().unwrap_or(&self.content)
    }

    pub fn was_translated(&self) -> bool {
        self.translated_content.is_some()
    }
}
