//! LLM outbound adapters.
//!
//! This module provides a thin HTTP implementation of the `TextGenerator`
//! port against an Anthropic-style messages endpoint.

mod dto;
mod http_generator;

pub use http_generator::{HttpTextGenerator, HttpTextGeneratorSettings};
