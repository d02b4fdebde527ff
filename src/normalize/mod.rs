//! Content normalization: clean text, page metadata and source language.
//!
//! Normalization fails soft. Markup it cannot make sense of yields less
//! text, and an undetectable language just means no translation.

mod html;
mod language;

pub use html::{clean_text, extract_metadata, visible_text};
pub use language::{detect_language, DETECTION_WINDOW};

use crate::models::PageMetadata;

/// Pages shorter than this are never worth translating.
pub const TRANSLATION_MIN_CHARS: usize = 200;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedContent {
    pub text: String,
    /// ISO 639-1 code, or None when detection had too little to go on.
    pub language: Option<String>,
    pub metadata: PageMetadata,
}

impl NormalizedContent {
    /// Whether the text should be translated into `target` before analysis.
    pub fn needs_translation(&self, target: &str) -> bool {
        match self.language.as_deref() {
            Some(lang) => {
                !lang.eq_ignore_ascii_case(target)
                    && self.text.chars().count() > TRANSLATION_MIN_CHARS
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Normalize raw page content.
pub fn normalize(content: &str) -> NormalizedContent {
    let text = visible_text(content);
    let language = detect_language(&text);
    let metadata = extract_metadata(content);

    NormalizedContent {
        text,
        language,
        metadata,
    }
}
