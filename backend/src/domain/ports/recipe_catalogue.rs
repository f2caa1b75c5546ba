//! Port for looking up recipe reference metadata.
use std::collections::HashMap;

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::{RecipeId, RecipeMeta};

define_port_error! {
    /// Errors raised by recipe catalogue adapters.
    pub enum RecipeCatalogueError {
        /// The dataset could not be read.
        Unavailable { message: String } => "recipe catalogue unavailable: {message}",
    }
}

/// Read access to the static recipe dataset.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipeCatalogue: Send + Sync {
    /// Fetch metadata for `id`; `Ok(None)` when the recipe is unknown.
    async fn recipe_metadata(&self, id: &RecipeId)
    -> Result<Option<RecipeMeta>, RecipeCatalogueError>;
}

/// In-memory catalogue built from a fixed list of recipes.
#[derive(Debug, Clone, Default)]
pub struct FixtureRecipeCatalogue {
    recipes: HashMap<RecipeId, RecipeMeta>,
}

impl FixtureRecipeCatalogue {
    /// Build a catalogue from recipes; later duplicates replace earlier ones.
    ///
    /// # Examples
    /// ```
    /// use backend::domain::{RecipeId, RecipeMeta};
    /// use backend::domain::ports::FixtureRecipeCatalogue;
    ///
    /// let catalogue = FixtureRecipeCatalogue::new([RecipeMeta {
    ///     id: RecipeId::new("r1").expect("valid id"),
    ///     title: "Focaccia".to_owned(),
    ///     ingredients: vec!["flour".to_owned()],
    ///     segment_count: 3,
    /// }]);
    /// assert_eq!(catalogue.len(), 1);
    /// ```
    pub fn new(recipes: impl IntoIterator<Item = RecipeMeta>) -> Self {
        Self {
            recipes: recipes
                .into_iter()
                .map(|recipe| (recipe.id.clone(), recipe))
                .collect(),
        }
    }

    /// Number of recipes held.
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    /// Whether the catalogue holds no recipes.
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

#[async_trait]
impl RecipeCatalogue for FixtureRecipeCatalogue {
    async fn recipe_metadata(
        &self,
        id: &RecipeId,
    ) -> Result<Option<RecipeMeta>, RecipeCatalogueError> {
        Ok(self.recipes.get(id).cloned())
    }
}
