//! Structured extraction through the analysis service.
//!
//! An attempt runs up to four kinds of sub-task: translation, summary, menu
//! and per-image classification. A failed sub-task is recorded on the result
//! and the rest carry on; the attempt only fails when the service could not
//! be reached for any of them.

mod images;
pub mod parse;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::fetcher::DiscoveredImage;
use crate::llm::lenient::{self, Decoded};
use crate::llm::prompts::{self, render};
use crate::llm::{truncate_content, LlmBackend, LlmError, Prompt, PromptKind};
use crate::models::{ExtractionResult, Menu, MenuSection, RestaurantSummary, TaskType};

pub use images::mean_confidence;
pub use parse::{
    extract_phone, parse_location, parse_michelin_stars, parse_price_tier, timezone_for_country,
};

/// Human-readable language name for prompts.
pub fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "sv" => "Swedish",
        "da" => "Danish",
        "ja" => "Japanese",
        "zh" => "Chinese",
        other => other,
    }
}

/// Counts sub-task outcomes so an attempt against a dead service can be told
/// apart from one that merely got poor answers.
#[derive(Default)]
struct Tally {
    attempted: usize,
    unavailable: usize,
    last_unavailable: Option<LlmError>,
}

impl Tally {
    fn attempt(&mut self) {
        self.attempted += 1;
    }

    fn failed(&mut self, stage: &str, err: LlmError, errors: &mut Vec<String>) {
        warn!("{} failed: {}", stage, err);
        errors.push(format!("{}: {}", stage, err));
        if err.is_unavailable() {
            self.unavailable += 1;
            self.last_unavailable = Some(err);
        }
    }

    fn all_unavailable(&self) -> bool {
        self.attempted > 0 && self.unavailable == self.attempted
    }
}

/// Runs the prompt templates against an [`LlmBackend`].
#[derive(Clone)]
pub struct ExtractionEngine {
    backend: Arc<dyn LlmBackend>,
    target_language: String,
    max_images: usize,
}

impl ExtractionEngine {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            target_language: "en".to_string(),
            max_images: 10,
        }
    }

    pub fn with_target_language(mut self, language: &str) -> Self {
        self.target_language = language.to_string();
        self
    }

    pub fn with_max_images(mut self, max_images: usize) -> Self {
        self.max_images = max_images;
        self
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    /// Fill the analysis fields of `result`.
    ///
    /// `result` arrives with content, language and metadata already set.
    /// Returns the service error only when every sub-task that ran failed
    /// because the service was unavailable.
    pub async fn extract(
        &self,
        mut result: ExtractionResult,
        images: &[DiscoveredImage],
        task_type: TaskType,
    ) -> Result<ExtractionResult, LlmError> {
        let mut tally = Tally::default();
        let mut errors = Vec::new();

        if self.should_translate(&result) {
            tally.attempt();
            match self.translate(&result).await {
                Ok(Some(text)) => result.translated_content = Some(text),
                Ok(None) => errors.push("translation: empty response".to_string()),
                Err(e) => tally.failed("translation", e, &mut errors),
            }
        }

        if task_type.wants_text() && !result.content.trim().is_empty() {
            tally.attempt();
            match self.summarize(result.analysis_text(), &result.url).await {
                Ok(decoded) => match decoded {
                    Decoded::Failed(reason) => errors.push(format!("summary: {}", reason)),
                    Decoded::Partial(summary) => {
                        errors.push("summary: partially decoded".to_string());
                        result.summary = Some(summary);
                    }
                    Decoded::Complete(summary) => result.summary = Some(summary),
                },
                Err(e) => tally.failed("summary", e, &mut errors),
            }

            if let Some(summary) = result.summary.as_mut() {
                if summary.phone.is_none() {
                    summary.phone = extract_phone(&result.content);
                }
            }

            tally.attempt();
            match self.structure_menu(result.analysis_text()).await {
                Ok(Decoded::Failed(reason)) => errors.push(format!("menu: {}", reason)),
                Ok(decoded) => {
                    if let Some(menu) = decoded.ok().filter(|m| !m.is_empty()) {
                        result.menu = Some(menu);
                    }
                }
                Err(e) => tally.failed("menu", e, &mut errors),
            }
        }

        if task_type.wants_images() {
            for image in images.iter().take(self.max_images) {
                tally.attempt();
                match self.classify_image(image, &result.url).await {
                    Ok(Some(classification)) => result.images.push(classification),
                    Ok(None) => errors.push(format!("image {}: could not decode", image.url)),
                    Err(e) => tally.failed(&format!("image {}", image.url), e, &mut errors),
                }
            }
        }

        result.errors.extend(errors);

        if tally.all_unavailable() {
            if let Some(err) = tally.last_unavailable {
                return Err(err);
            }
        }

        debug!(
            "Extraction for {}: summary={}, menu items={}, images={}, errors={}",
            result.url,
            result.summary.is_some(),
            result.menu.as_ref().map_or(0, Menu::item_count),
            result.images.len(),
            result.errors.len()
        );
        Ok(result)
    }

    fn should_translate(&self, result: &ExtractionResult) -> bool {
        match result.language.as_deref() {
            Some(lang) => {
                !lang.eq_ignore_ascii_case(&self.target_language)
                    && result.content.chars().count() > crate::normalize::TRANSLATION_MIN_CHARS
            }
            None => false,
        }
    }

    async fn translate(&self, result: &ExtractionResult) -> Result<Option<String>, LlmError> {
        let source = result.language.as_deref().unwrap_or("unknown");
        let user = render(
            prompts::TRANSLATION_PROMPT,
            &[
                ("source", language_name(source)),
                ("target", language_name(&self.target_language)),
                (
                    "content",
                    truncate_content(&result.content, prompts::TRANSLATION_CHARS),
                ),
            ],
        );
        let prompt = Prompt::new(
            PromptKind::Translation,
            prompts::TRANSLATION_SYSTEM,
            user,
            false,
        );
        let reply = self.backend.complete(&prompt).await?;
        let reply = reply.trim();
        Ok((!reply.is_empty()).then(|| reply.to_string()))
    }

    async fn summarize(
        &self,
        text: &str,
        url: &str,
    ) -> Result<Decoded<RestaurantSummary>, LlmError> {
        let user = render(
            prompts::SUMMARY_PROMPT,
            &[
                ("url", url),
                ("content", truncate_content(text, prompts::SUMMARY_CHARS)),
            ],
        );
        let prompt = Prompt::new(PromptKind::Summary, prompts::SUMMARY_SYSTEM, user, true);
        let reply = self.backend.complete(&prompt).await?;
        Ok(lenient::decode::<RestaurantSummary>(&reply).map(tidy_summary))
    }

    async fn structure_menu(&self, text: &str) -> Result<Decoded<Menu>, LlmError> {
        let user = render(
            prompts::MENU_PROMPT,
            &[("content", truncate_content(text, prompts::MENU_CHARS))],
        );
        let prompt = Prompt::new(PromptKind::Menu, prompts::MENU_SYSTEM, user, true);
        let reply = self.backend.complete(&prompt).await?;
        Ok(decode_menu(&reply))
    }

    async fn classify_image(
        &self,
        image: &DiscoveredImage,
        page_url: &str,
    ) -> Result<Option<crate::models::ImageClassification>, LlmError> {
        let user = render(
            prompts::IMAGE_PROMPT,
            &[
                ("image_url", image.url.as_str()),
                ("alt", image.alt.as_deref().unwrap_or("")),
                ("page_url", page_url),
            ],
        );
        let prompt = Prompt::new(
            PromptKind::ImageClassification,
            prompts::IMAGE_SYSTEM,
            user,
            true,
        );
        let reply = self.backend.complete(&prompt).await?;
        Ok(lenient::decode::<images::ImageReply>(&reply)
            .ok()
            .map(|r| r.into_classification(image)))
    }
}

/// Trim strings and drop blanks so "" never reaches the merge layer.
fn tidy_summary(mut summary: RestaurantSummary) -> RestaurantSummary {
    for slot in [
        &mut summary.description,
        &mut summary.cuisine,
        &mut summary.ambiance,
        &mut summary.price_range,
        &mut summary.phone,
        &mut summary.opening_hours,
        &mut summary.chef,
        &mut summary.philosophy,
    ] {
        *slot = slot
            .take()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"));
    }
    summary.highlights.retain(|h| !h.trim().is_empty());
    summary.confidence = summary.confidence.map(images::clamp_unit);
    summary
}

/// Menus sometimes come back as a bare array of sections.
fn decode_menu(raw: &str) -> Decoded<Menu> {
    match lenient::decode_value(raw) {
        Decoded::Complete(Value::Array(sections)) => Decoded::Complete(sections_to_menu(sections)),
        Decoded::Partial(Value::Array(sections)) => Decoded::Partial(sections_to_menu(sections)),
        Decoded::Failed(e) => Decoded::Failed(e),
        _ => lenient::decode::<Menu>(raw),
    }
}

fn sections_to_menu(sections: Vec<Value>) -> Menu {
    Menu {
        sections: sections
            .into_iter()
            .filter_map(|s| serde_json::from_value::<MenuSection>(s).ok())
            .filter(|s| !s.items.is_empty())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchMethod, ImageCategory};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers by prompt kind; `None` simulates an unreachable service.
    struct ScriptedBackend {
        translation: Option<&'static str>,
        summary: Option<&'static str>,
        menu: Option<&'static str>,
        image: Option<&'static str>,
        calls: Mutex<Vec<PromptKind>>,
    }

    impl ScriptedBackend {
        fn healthy() -> Self {
            Self {
                translation: Some("Welcome to our restaurant. Our chef cooks seasonal dishes."),
                summary: Some(
                    r#"```json
{"description": "Seasonal bistro", "cuisine": "French", "ambiance": "Cozy",
 "price_range": "€€€", "phone": "", "confidence": 0.9,}
```"#,
                ),
                menu: Some(
                    r#"{"sections": [{"section": "Mains", "items": [{"name": "Duck", "price": "32"}]}]}"#,
                ),
                image: Some(
                    r#"{"category": "menu_item", "category_confidence": 0.8, "labels": ["duck"], "description": "A plated duck breast", "description_confidence": 0.7}"#,
                ),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn down() -> Self {
            Self {
                translation: None,
                summary: None,
                menu: None,
                image: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<PromptKind> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
            self.calls.lock().unwrap().push(prompt.kind);
            let reply = match prompt.kind {
                PromptKind::Translation => self.translation,
                PromptKind::Summary => self.summary,
                PromptKind::Menu => self.menu,
                PromptKind::ImageClassification => self.image,
            };
            reply
                .map(str::to_string)
                .ok_or_else(|| LlmError::Connection("connection refused".to_string()))
        }
    }

    fn result(content: &str, language: Option<&str>) -> ExtractionResult {
        let mut r = ExtractionResult::new(
            "https://bistro.example",
            content.to_string(),
            "hash".to_string(),
            FetchMethod::Static,
        );
        r.language = language.map(str::to_string);
        r
    }

    fn images() -> Vec<DiscoveredImage> {
        vec![DiscoveredImage {
            url: "https://bistro.example/duck.jpg".to_string(),
            alt: Some("Duck".to_string()),
        }]
    }

    #[tokio::test]
    async fn test_text_task_runs_summary_and_menu() {
        let backend = Arc::new(ScriptedBackend::healthy());
        let engine = ExtractionEngine::new(backend.clone());
        let content = "Our restaurant serves seasonal dishes. Call +33 1 43 67 38 29 to book.";

        let out = engine
            .extract(result(content, Some("en")), &images(), TaskType::Text)
            .await
            .unwrap();

        assert_eq!(backend.calls(), vec![PromptKind::Summary, PromptKind::Menu]);
        let summary = out.summary.unwrap();
        assert_eq!(summary.cuisine.as_deref(), Some("French"));
        // Blank phone in the reply falls back to the regex.
        assert_eq!(summary.phone.as_deref(), Some("+33 1 43 67 38 29"));
        assert_eq!(out.menu.unwrap().item_count(), 1);
        assert!(out.images.is_empty());
        // Fenced output with a trailing comma decodes as partial.
        assert_eq!(out.errors, vec!["summary: partially decoded"]);
    }

    #[tokio::test]
    async fn test_foreign_text_is_translated_first() {
        let backend = Arc::new(ScriptedBackend::healthy());
        let engine = ExtractionEngine::new(backend.clone());
        let content = "Bienvenue dans notre restaurant. ".repeat(10);

        let out = engine
            .extract(result(&content, Some("fr")), &[], TaskType::Text)
            .await
            .unwrap();

        assert_eq!(backend.calls()[0], PromptKind::Translation);
        assert!(out.was_translated());
        assert!(out.analysis_text().starts_with("Welcome"));
    }

    #[tokio::test]
    async fn test_images_task_classifies_each_image() {
        let backend = Arc::new(ScriptedBackend::healthy());
        let engine = ExtractionEngine::new(backend.clone());

        let out = engine
            .extract(result("text", Some("en")), &images(), TaskType::Images)
            .await
            .unwrap();

        assert_eq!(backend.calls(), vec![PromptKind::ImageClassification]);
        assert_eq!(out.images.len(), 1);
        assert_eq!(out.images[0].category, ImageCategory::MenuItem);
        assert!(out.summary.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_fails_attempt() {
        let engine = ExtractionEngine::new(Arc::new(ScriptedBackend::down()));
        let err = engine
            .extract(result("Some restaurant text", Some("en")), &images(), TaskType::Comprehensive)
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_partial_failure_degrades_result() {
        let mut backend = ScriptedBackend::healthy();
        backend.menu = None;
        let engine = ExtractionEngine::new(Arc::new(backend));

        let out = engine
            .extract(result("Restaurant text", Some("en")), &[], TaskType::Text)
            .await
            .unwrap();
        assert!(out.summary.is_some());
        assert!(out.menu.is_none());
        assert!(out.errors.iter().any(|e| e.starts_with("menu: Connection error")));
    }

    #[tokio::test]
    async fn test_malformed_summary_is_recorded_not_fatal() {
        let mut backend = ScriptedBackend::healthy();
        backend.summary = Some("I could not find any restaurant information.");
        let engine = ExtractionEngine::new(Arc::new(backend));

        let out = engine
            .extract(result("Restaurant text", Some("en")), &[], TaskType::Text)
            .await
            .unwrap();
        assert!(out.summary.is_none());
        assert!(out.errors.iter().any(|e| e.starts_with("summary:")));
    }

    #[test]
    fn test_bare_array_menu_is_wrapped() {
        let menu = decode_menu(
            r#"[{"section": "Desserts", "items": [{"name": "Tarte Tatin"}]}, {"section": "Empty", "items": []}]"#,
        )
        .ok()
        .unwrap();
        assert_eq!(menu.sections.len(), 1);
        assert_eq!(menu.sections[0].items[0].name, "Tarte Tatin");
    }

    #[test]
    fn test_tidy_summary_drops_blank_and_null_strings() {
        let summary = tidy_summary(RestaurantSummary {
            cuisine: Some("  ".to_string()),
            ambiance: Some("null".to_string()),
            chef: Some(" Bertrand Grébaut ".to_string()),
            confidence: Some(3.0),
            ..Default::default()
        });
        assert_eq!(summary.cuisine, None);
        assert_eq!(summary.ambiance, None);
        assert_eq!(summary.chef.as_deref(), Some("Bertrand Grébaut"));
        assert_eq!(summary.confidence, Some(1.0));
    }
}
