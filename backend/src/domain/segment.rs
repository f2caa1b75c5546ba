//! Narrative segments and the keys that address them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RecipeId;

/// Composite key addressing one segment: `(recipe, index)`.
///
/// Keys order by recipe first, then by index, so segments of a recipe sort in
/// narrative order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentKey {
    recipe_id: RecipeId,
    index: u32,
}

impl SegmentKey {
    /// Build a key for `index` within `recipe_id`.
    pub fn new(recipe_id: RecipeId, index: u32) -> Self {
        Self { recipe_id, index }
    }

    /// Recipe owning the segment.
    pub fn recipe_id(&self) -> &RecipeId {
        &self.recipe_id
    }

    /// Position of the segment in the narrative; `0` is the initial load.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Key of the following segment, or `None` on index overflow.
    pub fn next(&self) -> Option<Self> {
        self.index
            .checked_add(1)
            .map(|index| Self::new(self.recipe_id.clone(), index))
    }

    /// Key of the preceding segment, or `None` for the initial segment.
    pub fn previous(&self) -> Option<Self> {
        self.index
            .checked_sub(1)
            .map(|index| Self::new(self.recipe_id.clone(), index))
    }
}

impl std::fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.recipe_id, self.index)
    }
}

/// How a segment reached the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOrigin {
    /// Served from the cache store.
    Cache,
    /// Produced by a generation call for this request or the job it joined.
    Generated,
}

impl SegmentOrigin {
    /// Stable label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Generated => "generated",
        }
    }
}

/// One unit of generated narrative text.
///
/// Segments are immutable once produced. Reading a cached segment keeps its
/// text and timestamp; only [`Segment::origin`] changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    text: String,
    origin: SegmentOrigin,
    created_at: DateTime<Utc>,
    size_bytes: usize,
}

impl Segment {
    /// Wrap freshly generated text.
    ///
    /// # Examples
    /// ```
    /// use backend::domain::{Segment, SegmentOrigin};
    /// use chrono::Utc;
    ///
    /// let segment = Segment::generated("Once upon a pan...", Utc::now());
    /// assert_eq!(segment.origin(), SegmentOrigin::Generated);
    /// assert_eq!(segment.size_bytes(), 18);
    /// ```
    pub fn generated(text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let text = text.into();
        Self {
            size_bytes: text.len(),
            text,
            origin: SegmentOrigin::Generated,
            created_at,
        }
    }

    /// Relabel the segment as served from cache.
    #[must_use]
    pub fn into_cached(self) -> Self {
        Self {
            origin: SegmentOrigin::Cache,
            ..self
        }
    }

    /// Narrative text.
    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    /// How this segment was served.
    pub fn origin(&self) -> SegmentOrigin {
        self.origin
    }

    /// When the text was generated.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// UTF-8 length of the text in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn key(recipe: &str, index: u32) -> SegmentKey {
        SegmentKey::new(RecipeId::new(recipe).expect("valid id"), index)
    }

    #[rstest]
    fn keys_order_by_recipe_then_index() {
        let mut keys = vec![key("b", 0), key("a", 2), key("a", 0), key("a", 1)];
        keys.sort();
        assert_eq!(keys, vec![key("a", 0), key("a", 1), key("a", 2), key("b", 0)]);
    }

    #[rstest]
    fn neighbours_stay_within_recipe() {
        let k = key("r1", 0);
        assert_eq!(k.next(), Some(key("r1", 1)));
        assert_eq!(k.previous(), None);
        assert_eq!(key("r1", u32::MAX).next(), None);
    }

    #[rstest]
    fn cached_relabel_keeps_content() {
        let at = Utc
            .with_ymd_and_hms(2026, 10, 1, 9, 0, 0)
            .single()
            .expect("valid time");
        let generated = Segment::generated("crème brûlée", at);
        let cached = generated.clone().into_cached();

        assert_eq!(cached.origin(), SegmentOrigin::Cache);
        assert_eq!(cached.text(), generated.text());
        assert_eq!(cached.created_at(), at);
        assert_eq!(cached.size_bytes(), "crème brûlée".len());
    }

    #[rstest]
    fn origin_serialises_as_snake_case() {
        let value = serde_json::to_value(SegmentOrigin::Generated).expect("serialises");
        assert_eq!(value, serde_json::json!("generated"));
        assert_eq!(SegmentOrigin::Cache.as_str(), "cache");
    }
}
