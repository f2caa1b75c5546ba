//! Recipe catalogue backed by a JSON dataset file.
//!
//! The dataset is a JSON array of recipe objects:
//!
//! ```json
//! [{ "id": "r1", "title": "Miso soup", "ingredients": ["miso"], "segmentCount": 3 }]
//! ```
//!
//! It is read once at startup through `cap-std` and served from memory.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cap_std::{ambient_authority, fs::Dir};
use thiserror::Error;
use tracing::info;

use crate::domain::ports::{RecipeCatalogue, RecipeCatalogueError};
use crate::domain::{RecipeId, RecipeMeta};

/// Errors raised while loading the recipe dataset.
#[derive(Debug, Error)]
pub enum RecipeDatasetError {
    /// The file could not be read.
    #[error("failed to read recipe dataset {path}: {source}")]
    Read {
        /// Dataset path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file is not a valid recipe array.
    #[error("failed to parse recipe dataset {path}: {source}")]
    Parse {
        /// Dataset path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A recipe breaks a dataset rule.
    #[error("invalid recipe dataset {path}: {message}")]
    Invalid {
        /// Dataset path.
        path: PathBuf,
        /// What is wrong.
        message: String,
    },
}

/// In-memory catalogue loaded from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonRecipeCatalogue {
    recipes: HashMap<RecipeId, RecipeMeta>,
}

impl JsonRecipeCatalogue {
    /// Load and validate the dataset at `path`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed, when a recipe id
    /// repeats, or when a recipe declares no segments.
    pub fn load(path: &Path) -> Result<Self, RecipeDatasetError> {
        let contents = read_dataset(path)?;
        let catalogue = Self::from_json(&contents).map_err(|error| match error {
            DatasetContentError::Parse(source) => RecipeDatasetError::Parse {
                path: path.to_path_buf(),
                source,
            },
            DatasetContentError::Invalid(message) => RecipeDatasetError::Invalid {
                path: path.to_path_buf(),
                message,
            },
        })?;
        info!(path = %path.display(), recipes = catalogue.len(), "recipe dataset loaded");
        Ok(catalogue)
    }

    fn from_json(contents: &str) -> Result<Self, DatasetContentError> {
        let entries: Vec<RecipeMeta> =
            serde_json::from_str(contents).map_err(DatasetContentError::Parse)?;
        let mut recipes = HashMap::with_capacity(entries.len());
        for recipe in entries {
            if recipe.segment_count == 0 {
                return Err(DatasetContentError::Invalid(format!(
                    "recipe {} declares no segments",
                    recipe.id
                )));
            }
            let id = recipe.id.clone();
            if recipes.insert(id.clone(), recipe).is_some() {
                return Err(DatasetContentError::Invalid(format!(
                    "recipe {id} appears more than once"
                )));
            }
        }
        Ok(Self { recipes })
    }

    /// Number of recipes loaded.
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    /// Whether the dataset was empty.
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

#[async_trait]
impl RecipeCatalogue for JsonRecipeCatalogue {
    async fn recipe_metadata(
        &self,
        id: &RecipeId,
    ) -> Result<Option<RecipeMeta>, RecipeCatalogueError> {
        Ok(self.recipes.get(id).cloned())
    }
}

enum DatasetContentError {
    Parse(serde_json::Error),
    Invalid(String),
}

fn read_dataset(path: &Path) -> Result<String, RecipeDatasetError> {
    let read_error = |source| RecipeDatasetError::Read {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        read_error(io::Error::new(
            io::ErrorKind::InvalidInput,
            "dataset path must be a file",
        ))
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(read_error)?;
    dir.read_to_string(Path::new(file_name)).map_err(read_error)
}
