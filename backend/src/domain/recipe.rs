//! Recipe identity and reference metadata.
//!
//! Recipes come from a static dataset and are never mutated by the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque recipe identifier.
///
/// ## Invariants
/// - Non-empty once trimmed.
/// - No leading or trailing whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecipeId(String);

/// Validation errors returned when constructing [`RecipeId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecipeIdValidationError {
    /// Identifier is empty after trimming whitespace.
    #[error("recipe id must not be empty")]
    Empty,
    /// Identifier contains leading or trailing whitespace.
    #[error("recipe id must not contain surrounding whitespace")]
    ContainsWhitespace,
}

impl RecipeId {
    /// Validate and wrap a recipe identifier.
    ///
    /// # Examples
    /// ```
    /// use backend::domain::RecipeId;
    ///
    /// let id = RecipeId::new("r1").expect("valid id");
    /// assert_eq!(id.as_str(), "r1");
    /// assert!(RecipeId::new(" r1").is_err());
    /// ```
    pub fn new(value: impl Into<String>) -> Result<Self, RecipeIdValidationError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(RecipeIdValidationError::Empty);
        }
        if raw.trim() != raw {
            return Err(RecipeIdValidationError::ContainsWhitespace);
        }
        Ok(Self(raw))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for RecipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for RecipeId {
    type Error = RecipeIdValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecipeId> for String {
    fn from(value: RecipeId) -> Self {
        value.0
    }
}

/// Reference metadata for one recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeMeta {
    /// Recipe identifier.
    pub id: RecipeId,
    /// Display title used in prompts.
    pub title: String,
    /// Ingredient lines used in prompts.
    pub ingredients: Vec<String>,
    /// Number of narrative segments in the recipe story.
    pub segment_count: u32,
}

impl RecipeMeta {
    /// Whether `index` addresses a segment of this recipe's story.
    pub fn has_segment(&self, index: u32) -> bool {
        index < self.segment_count
    }

    /// Index of the final segment, or `None` for an empty story.
    pub fn last_index(&self) -> Option<u32> {
        self.segment_count.checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    //! Validates recipe id parsing and segment bounds.
    use super::*;
    use rstest::rstest;

    fn recipe(segment_count: u32) -> RecipeMeta {
        RecipeMeta {
            id: RecipeId::new("r1").expect("valid id"),
            title: "Shakshuka".to_owned(),
            ingredients: vec!["eggs".to_owned()],
            segment_count,
        }
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn recipe_id_rejects_blank(#[case] value: &str) {
        assert_eq!(RecipeId::new(value), Err(RecipeIdValidationError::Empty));
    }

    #[rstest]
    #[case(" r1")]
    #[case("r1\n")]
    fn recipe_id_rejects_padding(#[case] value: &str) {
        assert_eq!(
            RecipeId::new(value),
            Err(RecipeIdValidationError::ContainsWhitespace)
        );
    }

    #[rstest]
    #[case(3, 0, true)]
    #[case(3, 2, true)]
    #[case(3, 3, false)]
    #[case(0, 0, false)]
    fn has_segment_respects_count(#[case] count: u32, #[case] index: u32, #[case] expected: bool) {
        assert_eq!(recipe(count).has_segment(index), expected);
    }

    #[rstest]
    fn last_index_handles_empty_story() {
        assert_eq!(recipe(0).last_index(), None);
        assert_eq!(recipe(3).last_index(), Some(2));
    }

    #[rstest]
    fn deserialises_from_dataset_shape() {
        let meta: RecipeMeta = serde_json::from_str(
            r#"{"id":"r9","title":"Dal","ingredients":["lentils"],"segmentCount":4}"#,
        )
        .expect("valid recipe json");
        assert_eq!(meta.id.as_str(), "r9");
        assert_eq!(meta.segment_count, 4);
    }

    #[rstest]
    fn deserialising_rejects_blank_ids() {
        let result = serde_json::from_str::<RecipeMeta>(
            r#"{"id":" ","title":"Dal","ingredients":[],"segmentCount":1}"#,
        );
        assert!(result.is_err());
    }
}
