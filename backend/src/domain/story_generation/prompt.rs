//! Deterministic prompt construction for story segments.
//!
//! The same recipe, index and prior context always produce the same prompt
//! text, so identical requests are interchangeable across retries.

use thiserror::Error;

use crate::domain::{RecipeId, RecipeMeta};

const WORD_LIMIT: u32 = 200;

/// Reasons a prompt cannot be built. These never reach the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    /// Recipe title is blank.
    #[error("recipe {recipe_id} has a blank title")]
    BlankTitle {
        /// Offending recipe.
        recipe_id: RecipeId,
    },
    /// Recipe lists no usable ingredients.
    #[error("recipe {recipe_id} lists no ingredients")]
    NoIngredients {
        /// Offending recipe.
        recipe_id: RecipeId,
    },
    /// Requested index lies past the end of the story.
    #[error("segment {index} is outside the {segment_count}-part story")]
    IndexOutOfRange {
        /// Requested index.
        index: u32,
        /// Segments in the story.
        segment_count: u32,
    },
}

/// Prompt sent to the LLM for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryPrompt {
    recipe_id: RecipeId,
    title: String,
    index: u32,
    has_context: bool,
    text: String,
}

impl StoryPrompt {
    /// Build the prompt for segment `index` of `recipe`.
    ///
    /// `prior_context` is the text of the preceding segment; only its last
    /// `max_context_chars` characters are quoted.
    ///
    /// # Examples
    /// ```
    /// use backend::domain::{RecipeId, RecipeMeta};
    /// use backend::domain::story_generation::StoryPrompt;
    ///
    /// let recipe = RecipeMeta {
    ///     id: RecipeId::new("r1").expect("valid id"),
    ///     title: "Miso soup".to_owned(),
    ///     ingredients: vec!["miso".to_owned(), "tofu".to_owned()],
    ///     segment_count: 3,
    /// };
    /// let prompt = StoryPrompt::build(&recipe, 1, Some("The broth simmered."), 500)?;
    /// assert!(prompt.text().contains("The broth simmered."));
    /// assert!(prompt.text().contains("part 2 of 3"));
    /// # Ok::<(), backend::domain::story_generation::PromptError>(())
    /// ```
    pub fn build(
        recipe: &RecipeMeta,
        index: u32,
        prior_context: Option<&str>,
        max_context_chars: usize,
    ) -> Result<Self, PromptError> {
        let title = recipe.title.trim();
        if title.is_empty() {
            return Err(PromptError::BlankTitle {
                recipe_id: recipe.id.clone(),
            });
        }
        let ingredients: Vec<&str> = recipe
            .ingredients
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect();
        if ingredients.is_empty() {
            return Err(PromptError::NoIngredients {
                recipe_id: recipe.id.clone(),
            });
        }
        if !recipe.has_segment(index) {
            return Err(PromptError::IndexOutOfRange {
                index,
                segment_count: recipe.segment_count,
            });
        }

        let context = prior_context
            .filter(|_| index > 0)
            .map(|text| context_tail(text, max_context_chars))
            .filter(|tail| !tail.is_empty());

        let mut text = format!(
            "You are narrating the story behind the recipe \"{title}\".\nIngredients:\n"
        );
        for line in &ingredients {
            text.push_str("- ");
            text.push_str(line);
            text.push('\n');
        }

        let part = index.saturating_add(1);
        let total = recipe.segment_count;
        if index == 0 {
            text.push_str(&format!(
                "Write the opening segment (part 1 of {total}). Introduce the dish and set the scene.\n"
            ));
        } else {
            text.push_str(&format!("Continue the story with part {part} of {total}.\n"));
            if let Some(tail) = context {
                text.push_str("The story so far ends with:\n\"\"\"\n");
                text.push_str(tail);
                text.push_str("\n\"\"\"\n");
            }
            if recipe.last_index() == Some(index) {
                text.push_str("Bring the story to a satisfying close.\n");
            } else {
                text.push_str("End at a natural pause; the story continues afterwards.\n");
            }
        }
        text.push_str(&format!("Keep it under {WORD_LIMIT} words."));

        Ok(Self {
            recipe_id: recipe.id.clone(),
            title: title.to_owned(),
            index,
            has_context: context.is_some(),
            text,
        })
    }

    /// Recipe the prompt belongs to.
    pub fn recipe_id(&self) -> &RecipeId {
        &self.recipe_id
    }

    /// Trimmed recipe title.
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Segment index the prompt asks for.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether prior narrative was quoted.
    pub fn has_context(&self) -> bool {
        self.has_context
    }

    /// Full prompt text.
    pub fn text(&self) -> &str {
        self.text.as_str()
    }
}

fn context_tail(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text.trim();
    }
    let skip = total - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map_or(text.len(), |(offset, _)| offset);
    text.get(start..).unwrap_or_default().trim()
}
