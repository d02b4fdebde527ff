//! Image classification replies.

use serde::{Deserialize, Serialize};

use crate::fetcher::DiscoveredImage;
use crate::models::{ImageCategory, ImageClassification};

/// Shape the classification prompt asks for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ImageReply {
    pub category: String,
    pub category_confidence: f64,
    pub labels: Vec<String>,
    pub description: Option<String>,
    pub description_confidence: f64,
}

impl ImageReply {
    pub(crate) fn into_classification(self, image: &DiscoveredImage) -> ImageClassification {
        let labels = self
            .labels
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        ImageClassification {
            url: image.url.clone(),
            category: ImageCategory::from_str(&self.category),
            category_confidence: clamp_unit(self.category_confidence),
            labels,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            description_confidence: clamp_unit(self.description_confidence),
        }
    }
}

/// Confidence values outside [0, 1] are clamped; NaN counts as zero.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Mean of both confidences across classified images.
pub fn mean_confidence(images: &[ImageClassification]) -> Option<f64> {
    if images.is_empty() {
        return None;
    }
    let total: f64 = images
        .iter()
        .map(|i| (i.category_confidence + i.description_confidence) / 2.0)
        .sum();
    Some(total / images.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> DiscoveredImage {
        DiscoveredImage {
            url: "https://example.com/img/terrace.jpg".to_string(),
            alt: Some("Terrace".to_string()),
        }
    }

    #[test]
    fn test_reply_maps_category_and_clamps() {
        let reply = ImageReply {
            category: "Scenery_Ambiance".to_string(),
            category_confidence: 1.4,
            labels: vec!["terrace".to_string(), "  ".to_string()],
            description: Some(" Outdoor seating ".to_string()),
            description_confidence: -0.2,
        };
        let c = reply.into_classification(&image());
        assert_eq!(c.category, ImageCategory::SceneryAmbiance);
        assert_eq!(c.category_confidence, 1.0);
        assert_eq!(c.description_confidence, 0.0);
        assert_eq!(c.labels, vec!["terrace"]);
        assert_eq!(c.description.as_deref(), Some("Outdoor seating"));
    }

    #[test]
    fn test_unknown_category_is_uncategorized() {
        let reply = ImageReply {
            category: "logo".to_string(),
            ..Default::default()
        };
        assert_eq!(
            reply.into_classification(&image()).category,
            ImageCategory::Uncategorized
        );
    }

    #[test]
    fn test_mean_confidence() {
        assert_eq!(mean_confidence(&[]), None);
        let mut a = ImageReply::default().into_classification(&image());
        a.category_confidence = 0.8;
        a.description_confidence = 0.6;
        let mut b = a.clone();
        b.category_confidence = 0.4;
        b.description_confidence = 0.2;
        let mean = mean_confidence(&[a, b]).unwrap();
        assert!((mean - 0.5).abs() < 1e-9);
    }
}
