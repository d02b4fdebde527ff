//! Data models for the enrichment pipeline.

mod backlog;
mod extraction;
mod restaurant;

pub use backlog::{BacklogStats, BacklogTask, RetryPolicy, TaskStatus, TaskType};
pub use extraction::{
    ExtractionResult, FetchMethod, ImageCategory, ImageClassification, Menu, MenuItem,
    MenuSection, PageMetadata, RestaurantSummary,
};
pub use restaurant::{EnrichmentPatch, NewRestaurant, RecordField, Restaurant};
