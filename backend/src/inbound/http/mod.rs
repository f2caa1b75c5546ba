//! HTTP inbound adapter exposing story and health endpoints.

pub mod error;
pub mod health;
pub mod state;
pub mod stories;

pub use error::ApiResult;
