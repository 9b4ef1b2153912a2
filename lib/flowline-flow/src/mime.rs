//! Mime type sets with `type/*` wildcard matching.
//!
//! Edge definitions declare one or more accepted mime types; `MimeSet`
//! answers whether a concrete mime string satisfies that declaration,
//! honoring the `"<prefix>/*"` wildcard form.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A set of accepted mime type strings, e.g. `{"image/png", "text/*"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimeSet(HashSet<String>);

impl MimeSet {
    /// Builds a set from an iterator of mime strings.
    pub fn new(types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(types.into_iter().map(Into::into).collect())
    }

    /// Returns true if `mime` is accepted by this set, directly or via a
    /// `"<prefix>/*"` wildcard entry.
    #[must_use]
    pub fn contains(&self, mime: &str) -> bool {
        if self.0.contains(mime) {
            return true;
        }
        let Some((prefix, _)) = mime.split_once('/') else {
            return false;
        };
        self.0.contains(&format!("{prefix}/*"))
    }

    /// Returns true if any type in `self` is accepted by any type in
    /// `other` or vice versa — used for producer/consumer compatibility at
    /// admission time (validation rule 8).
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.0.iter().any(|t| other.contains(t)) || other.0.iter().any(|t| self.contains(t))
    }

    /// Returns the single mime type in this set, if it contains exactly
    /// one and it isn't a wildcard. Used to resolve an output's file
    /// extension when the declared type is unambiguous.
    #[must_use]
    pub fn exact_single(&self) -> Option<&str> {
        if self.0.len() != 1 {
            return None;
        }
        let only = self.0.iter().next()?;
        (!only.ends_with("/*")).then_some(only.as_str())
    }

    /// Iterates the declared mime strings.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let set = MimeSet::new(["image/png"]);
        assert!(set.contains("image/png"));
        assert!(!set.contains("image/jpeg"));
    }

    #[test]
    fn wildcard_match() {
        let set = MimeSet::new(["text/*"]);
        assert!(set.contains("text/plain"));
        assert!(set.contains("text/csv"));
        assert!(!set.contains("image/png"));
    }

    #[test]
    fn malformed_mime_never_matches_wildcard() {
        let set = MimeSet::new(["text/*"]);
        assert!(!set.contains("not-a-mime"));
    }

    #[test]
    fn intersects_detects_shared_type() {
        let producer = MimeSet::new(["image/png"]);
        let consumer = MimeSet::new(["application/pdf", "image/*"]);
        assert!(producer.intersects(&consumer));
    }

    #[test]
    fn intersects_false_when_disjoint() {
        let producer = MimeSet::new(["image/png"]);
        let consumer = MimeSet::new(["application/pdf"]);
        assert!(!producer.intersects(&consumer));
    }

    #[test]
    fn exact_single_only_for_singleton_non_wildcard() {
        assert_eq!(MimeSet::new(["image/png"]).exact_single(), Some("image/png"));
        assert_eq!(MimeSet::new(["image/*"]).exact_single(), None);
        assert_eq!(MimeSet::new(["image/png", "image/jpeg"]).exact_single(), None);
    }
}
