//! One enrichment attempt for one target, end to end.
//!
//! fetch home page (+ sub-pages, images) -> normalize -> extract -> score ->
//! merge. Rejected attempts never reach the record store.

mod error;
mod patch;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::extraction::ExtractionEngine;
use crate::fetcher::{discover_images, discover_subpages, FetchStrategy, PageSource};
use crate::models::{ExtractionResult, FetchMethod, Restaurant, TaskType};
use crate::normalize::{self, visible_text};
use crate::quality;
use crate::repository::RestaurantRepository;

pub use error::AttemptError;
pub use patch::{content_hash, patch_from};

/// A record to enrich, resolved to a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub restaurant_id: i64,
    pub name: String,
    pub url: String,
}

impl Target {
    pub fn new(restaurant_id: i64, name: &str, url: &str) -> Self {
        Self {
            restaurant_id,
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    /// Target for a record, or None when it has no URL.
    pub fn from_restaurant(restaurant: &Restaurant) -> Option<Self> {
        restaurant
            .target_url()
            .map(|url| Self::new(restaurant.id, &restaurant.name, url))
    }
}

/// What an accepted attempt did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub restaurant_id: i64,
    pub url: String,
    pub fetch_method: Option<FetchMethod>,
    pub language: Option<String>,
    pub translated: bool,
    pub quality_score: f64,
    /// Content hash matched an already-enriched record; nothing was written.
    pub unchanged: bool,
    pub pages_fetched: usize,
    pub images_classified: usize,
    pub menu_items: usize,
    /// Sub-task failures that degraded the result.
    pub warnings: Vec<String>,
}

/// Runs one attempt for one target. The seam the orchestrator drives.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(
        &self,
        target: &Target,
        task_type: TaskType,
    ) -> Result<AttemptOutcome, AttemptError>;
}

/// Per-attempt knobs.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub strategy: FetchStrategy,
    pub max_subpages: usize,
    pub max_images: usize,
    /// Apply every extracted value and re-run unchanged pages.
    pub force: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            strategy: FetchStrategy::Auto,
            max_subpages: 10,
            max_images: 10,
            force: false,
        }
    }
}

/// The production [`Enricher`].
pub struct EnrichmentPipeline {
    source: Arc<dyn PageSource>,
    engine: ExtractionEngine,
    restaurants: RestaurantRepository,
    options: PipelineOptions,
}

impl EnrichmentPipeline {
    pub fn new(
        source: Arc<dyn PageSource>,
        engine: ExtractionEngine,
        restaurants: RestaurantRepository,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            engine,
            restaurants,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Already enriched from identical content?
    fn is_unchanged(&self, target: &Target, hash: &str) -> Result<bool, AttemptError> {
        if self.options.force {
            return Ok(false);
        }
        let record = self
            .restaurants
            .get(target.restaurant_id)?
            .ok_or_else(|| {
                AttemptError::InvalidTarget(format!("restaurant {} not found", target.restaurant_id))
            })?;
        Ok(record.is_enriched() && record.content_hash.as_deref() == Some(hash))
    }

    /// Visible text of discovered sub-pages. Failures only cost coverage.
    async fn fetch_subpages(&self, links: &[String]) -> Vec<String> {
        let mut texts = Vec::new();
        for link in links {
            match self.source.fetch(link, FetchStrategy::Static).await {
                Ok(page) => {
                    let text = visible_text(&page.content);
                    if !text.is_empty() {
                        texts.push(text);
                    }
                }
                Err(e) => debug!("Skipping sub-page {}: {}", link, e),
            }
        }
        texts
    }
}

#[async_trait]
impl Enricher for EnrichmentPipeline {
    async fn enrich(
        &self,
        target: &Target,
        task_type: TaskType,
    ) -> Result<AttemptOutcome, AttemptError> {
        if target.url.trim().is_empty() {
            return Err(AttemptError::InvalidTarget(format!(
                "{} has no website",
                target.name
            )));
        }

        let home = self.source.fetch(&target.url, self.options.strategy).await?;
        let hash = content_hash(&home.content);

        if self.is_unchanged(target, &hash)? {
            info!("{} unchanged since last enrichment, skipping", target.name);
            return Ok(AttemptOutcome {
                restaurant_id: target.restaurant_id,
                url: target.url.clone(),
                fetch_method: Some(home.method),
                language: None,
                translated: false,
                quality_score: 0.0,
                unchanged: true,
                pages_fetched: 1,
                images_classified: 0,
                menu_items: 0,
                warnings: Vec::new(),
            });
        }

        let normalized = normalize::normalize(&home.content);
        let mut text = normalized.text;
        let mut pages_fetched = 1;

        if task_type.wants_text() && self.options.max_subpages > 0 {
            let links = discover_subpages(&home.content, &home.final_url, self.options.max_subpages);
            let subpages = self.fetch_subpages(&links).await;
            pages_fetched += subpages.len();
            for sub in subpages {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&sub);
            }
        }

        let images = if task_type.wants_images() {
            discover_images(&home.content, &home.final_url, self.options.max_images)
        } else {
            Vec::new()
        };

        let mut result = ExtractionResult::new(&target.url, text, hash, home.method);
        result.language = normalized.language;
        result.metadata = normalized.metadata;

        let mut result = self.engine.extract(result, &images, task_type).await?;

        let score = quality::score(&result);
        result.quality_score = score;
        if !quality::is_acceptable(score) {
            return Err(if result.errors.is_empty() {
                AttemptError::LowQuality { score }
            } else {
                AttemptError::Degraded {
                    score,
                    reason: result.errors.join("; "),
                }
            });
        }
        result.success = true;

        let patch = patch_from(&result, Utc::now());
        self.restaurants
            .apply_enrichment(target.restaurant_id, &patch, self.options.force)?;

        info!(
            "Enriched {} (quality {:.2}, {} page(s))",
            target.name, score, pages_fetched
        );

        Ok(AttemptOutcome {
            restaurant_id: target.restaurant_id,
            url: target.url.clone(),
            fetch_method: Some(result.fetch_method),
            translated: result.was_translated(),
            language: result.language,
            quality_score: score,
            unchanged: false,
            pages_fetched,
            images_classified: result.images.len(),
            menu_items: result.menu.as_ref().map_or(0, |m| m.item_count()),
            warnings: result.errors,
        })
    }
}
