//! Field-level merge rules for accepted enrichments.
//!
//! Rules are data: each enrichable field maps to one [`MergeRule`] and
//! [`merge`] walks the table. Nothing here touches the database.

use crate::models::{EnrichmentPatch, RecordField, Restaurant};

/// Policy deciding whether an extracted value replaces the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Replace only when the new value is strictly longer.
    ReplaceIfLonger,
    /// Fill the field only when nothing is stored.
    SetIfEmpty,
    /// Replace whenever an extracted value is present.
    SetIfPresent,
    /// Replace on every accepted attempt.
    AlwaysOverwrite,
}

impl MergeRule {
    /// Should `new` replace `existing` under this rule?
    pub fn accepts(&self, existing: Option<&str>, new: Option<&str>, force: bool) -> bool {
        let Some(new) = new else {
            return false;
        };
        if force {
            return true;
        }
        match self {
            Self::ReplaceIfLonger => {
                new.chars().count() > existing.map(|e| e.chars().count()).unwrap_or(0)
            }
            Self::SetIfEmpty => existing.is_none(),
            Self::SetIfPresent | Self::AlwaysOverwrite => true,
        }
    }
}

/// The merge rule table.
pub const MERGE_RULES: &[(RecordField, MergeRule)] = &[
    (RecordField::Description, MergeRule::ReplaceIfLonger),
    (RecordField::CuisineType, MergeRule::SetIfEmpty),
    (RecordField::Atmosphere, MergeRule::SetIfPresent),
    (RecordField::PriceRange, MergeRule::SetIfEmpty),
    (RecordField::Phone, MergeRule::SetIfEmpty),
    (RecordField::OpeningHours, MergeRule::SetIfEmpty),
    (RecordField::ScrapedContent, MergeRule::AlwaysOverwrite),
];

/// Look up the rule for a field.
pub fn rule_for(field: RecordField) -> MergeRule {
    MERGE_RULES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, rule)| *rule)
        .unwrap_or(MergeRule::SetIfEmpty)
}

/// Apply an accepted patch to a record.
///
/// Empty extracted values never clear stored ones, even with `force`.
/// `scraped_at` and the content hash travel with `scraped_content` and are
/// stamped on every accepted attempt.
pub fn merge(existing: &Restaurant, patch: &EnrichmentPatch, force: bool) -> Restaurant {
    let mut merged = existing.clone();

    for (field, rule) in MERGE_RULES {
        let new = patch.field(*field);
        if rule.accepts(existing.field(*field), new, force) {
            if let Some(value) = new {
                merged.set_field(*field, value.trim().to_string());
            }
        }
    }

    if patch.content_hash.is_some() {
        merged.content_hash = patch.content_hash.clone();
    }
    merged.scraped_at = Some(patch.scraped_at);
    merged
}
