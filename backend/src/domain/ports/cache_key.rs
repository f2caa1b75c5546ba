//! Namespaced cache key shared by segment cache adapters.
//!
//! Keys take the form `story:v1:<fingerprint>:<index>`. The fingerprint is the
//! full hex SHA-256 of the recipe id so arbitrary ids stay safe for any
//! backend, and bumping the version prefix invalidates every stored segment.
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::SegmentKey;

const NAMESPACE: &str = "story:v1";

/// Cache key used to store and retrieve generated segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentCacheKey(String);

impl SegmentCacheKey {
    /// Construct a cache key after validating that it is non-empty and trimmed.
    pub fn new(value: impl Into<String>) -> Result<Self, SegmentCacheKeyValidationError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(SegmentCacheKeyValidationError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(SegmentCacheKeyValidationError::ContainsWhitespace);
        }
        Ok(Self(raw))
    }

    /// Derive the namespaced key for a segment.
    ///
    /// # Examples
    /// ```
    /// use backend::domain::{RecipeId, SegmentKey};
    /// use backend::domain::ports::SegmentCacheKey;
    ///
    /// let key = SegmentKey::new(RecipeId::new("r1").expect("valid id"), 2);
    /// let cache_key = SegmentCacheKey::for_segment(&key);
    /// assert!(cache_key.as_str().starts_with("story:v1:"));
    /// assert!(cache_key.as_str().ends_with(":2"));
    /// ```
    pub fn for_segment(key: &SegmentKey) -> Self {
        let digest = Sha256::digest(key.recipe_id().as_str().as_bytes());
        let fingerprint = hex::encode(digest);
        Self(format!("{NAMESPACE}:{fingerprint}:{index}", index = key.index()))
    }

    /// Borrow the underlying key as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for SegmentCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for SegmentCacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&SegmentKey> for SegmentCacheKey {
    fn from(key: &SegmentKey) -> Self {
        Self::for_segment(key)
    }
}

/// Validation errors returned when constructing [`SegmentCacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentCacheKeyValidationError {
    /// Key is empty after trimming whitespace.
    #[error("segment cache key must not be empty")]
    Empty,
    /// Key contains whitespace.
    #[error("segment cache key must not contain whitespace")]
    ContainsWhitespace,
}

#[cfg(test)]
mod tests {
    //! Validates cache key derivation and whitespace constraints.
    use super::{SegmentCacheKey, SegmentCacheKeyValidationError};
    use crate::domain::{RecipeId, SegmentKey};
    use rstest::rstest;

    fn segment(recipe: &str, index: u32) -> SegmentKey {
        SegmentKey::new(RecipeId::new(recipe).expect("valid id"), index)
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn cache_key_rejects_blank(#[case] value: &str) {
        let err = SegmentCacheKey::new(value).expect_err("blank keys rejected");
        assert_eq!(err, SegmentCacheKeyValidationError::Empty);
    }

    #[rstest]
    #[case(" leading")]
    #[case("inner space")]
    fn cache_key_rejects_whitespace(#[case] value: &str) {
        let err = SegmentCacheKey::new(value).expect_err("whitespace rejected");
        assert_eq!(err, SegmentCacheKeyValidationError::ContainsWhitespace);
    }

    #[rstest]
    fn derived_keys_are_stable_and_distinct() {
        let first = SegmentCacheKey::for_segment(&segment("r1", 0));
        assert_eq!(first, SegmentCacheKey::for_segment(&segment("r1", 0)));
        assert_ne!(first, SegmentCacheKey::for_segment(&segment("r1", 1)));
        assert_ne!(first, SegmentCacheKey::for_segment(&segment("r2", 0)));
    }

    #[rstest]
    fn derived_keys_hide_raw_recipe_ids() {
        let key = SegmentCacheKey::for_segment(&segment("weird:id/with*chars", 7));
        let parts: Vec<&str> = key.as_str().split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "story");
        assert_eq!(parts[1], "v1");
        assert_eq!(parts[2].len(), 64);
        assert_eq!(parts[3], "7");
        assert!(SegmentCacheKey::new(key.to_string()).is_ok());
    }

    #[rstest]
    fn fingerprint_is_the_full_sha256_digest() {
        let key = SegmentCacheKey::for_segment(&segment("r1", 0));
        assert_eq!(
            key.as_str(),
            "story:v1:82f3e9c695dc6b8d1b11818d5701919e286de8d47f7c3eb3100c485f79e57828:0"
        );
    }
}
