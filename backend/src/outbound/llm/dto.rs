//! Wire types for the messages endpoint.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(super) struct MessagesRequestDto<'a> {
    pub(super) model: &'a str,
    pub(super) max_tokens: u32,
    pub(super) temperature: f32,
    pub(super) messages: [MessageDto<'a>; 1],
}

#[derive(Debug, Serialize)]
pub(super) struct MessageDto<'a> {
    pub(super) role: &'a str,
    pub(super) content: [ContentBlockDto<'a>; 1],
}

#[derive(Debug, Serialize)]
pub(super) struct ContentBlockDto<'a> {
    #[serde(rename = "type")]
    pub(super) kind: &'a str,
    pub(super) text: &'a str,
}

impl<'a> MessagesRequestDto<'a> {
    pub(super) fn user_prompt(model: &'a str, max_tokens: u32, temperature: f32, prompt: &'a str) -> Self {
        Self {
            model,
            max_tokens,
            temperature,
            messages: [MessageDto {
                role: "user",
                content: [ContentBlockDto {
                    kind: "text",
                    text: prompt,
                }],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct MessagesResponseDto {
    #[serde(default)]
    pub(super) content: Vec<ResponseBlockDto>,
    #[serde(default)]
    pub(super) stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum ResponseBlockDto {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl MessagesResponseDto {
    /// Concatenated text blocks, `None` when there are none.
    pub(super) fn into_text(self) -> Option<String> {
        let text = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlockDto::Text { text } => Some(text),
                ResponseBlockDto::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }
}
