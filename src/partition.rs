//! US / non-US partitioning of location labels.
//!
//! Partitioning is a keyword heuristic, not a country-code parser: a label is
//! "US" when it contains any configured keyword, compared case-insensitively
//! as a substring. The default keyword list covers the country name and codes
//! plus major US cities, in both the English and Chinese spellings the lookup
//! service produces.
//!
//! An unresolved lookup is never a US match; addresses whose location could
//! not be determined always flow to the non-US partition. That is a definite
//! policy, not an accident of implementation.

use crate::models::GeoLabel;

/// Matches location labels against a fixed set of US-indicating keywords.
///
/// Keywords are lowercased once at construction; each match lowercases the
/// candidate label and checks for substring containment.
#[derive(Debug)]
pub struct UsMatcher {
    keywords: Vec<String>,
}

impl UsMatcher {
    /// Build a matcher from the configured keyword list.
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Whether a label belongs to the US partition.
    ///
    /// [`GeoLabel::Unresolved`] never matches.
    pub fn is_us(&self, label: &GeoLabel) -> bool {
        match label {
            GeoLabel::Resolved(text) => {
                let lowered = text.to_lowercase();
                self.keywords.iter().any(|k| lowered.contains(k.as_str()))
            }
            GeoLabel::Unresolved => false,
        }
    }
}
