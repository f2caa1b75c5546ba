//! Story segment endpoints.
//!
//! ```text
//! GET /api/recipe/{id}/initial
//! GET /api/recipe/{id}/segment/{n}
//! ```
//!
//! Both routes call [`StoryPipeline::get_segment`](crate::domain::StoryPipeline::get_segment)
//! and render the segment as JSON. Serving a segment schedules prefetch of
//! the next one before the response is written.

use actix_web::{HttpResponse, get, web};
use serde::Serialize;

use crate::domain::{Error, RecipeId, Segment, SegmentOrigin};
use crate::inbound::http::ApiResult;
use crate::inbound::http::state::HttpState;

/// Response payload for one story segment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentResponse {
    pub recipe_id: String,
    pub index: u32,
    pub text: String,
    /// `cache` or `generated`.
    pub origin: SegmentOrigin,
    /// RFC 3339 generation timestamp.
    pub created_at: String,
    pub size_bytes: usize,
}

impl SegmentResponse {
    fn new(recipe_id: &RecipeId, index: u32, segment: Segment) -> Self {
        Self {
            recipe_id: recipe_id.to_string(),
            index,
            origin: segment.origin(),
            created_at: segment.created_at().to_rfc3339(),
            size_bytes: segment.size_bytes(),
            text: segment.text().to_owned(),
        }
    }
}

fn parse_recipe_id(raw: String) -> Result<RecipeId, Error> {
    RecipeId::new(raw).map_err(|err| Error::invalid_request(err.to_string()))
}

/// Path extractor settings that report malformed indices as
/// `invalid_request` rather than actix's default 404.
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req| {
        Error::invalid_request(format!("invalid path: {err}")).into()
    })
}

async fn serve(state: &HttpState, raw_id: String, index: u32) -> ApiResult<HttpResponse> {
    let recipe_id = parse_recipe_id(raw_id)?;
    let segment = state.pipeline.get_segment(&recipe_id, index).await?;
    Ok(HttpResponse::Ok().json(SegmentResponse::new(&recipe_id, index, segment)))
}

/// Fetch the opening segment of a recipe's story.
#[get("/recipe/{id}/initial")]
pub async fn get_initial_segment(
    state: web::Data<HttpState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    serve(&state, path.into_inner(), 0).await
}

/// Fetch segment `n` of a recipe's story.
#[get("/recipe/{id}/segment/{n}")]
pub async fn get_story_segment(
    state: web::Data<HttpState>,
    path: web::Path<(String, u32)>,
) -> ApiResult<HttpResponse> {
    let (raw_id, index) = path.into_inner();
    serve(&state, raw_id, index).await
}


#[cfg(test)]
mod parse_tests {
    use rstest::rstest;

    use super::*;
    use crate::domain::ErrorCode;

    #[rstest]
    #[case::leading_space(" r1")]
    #[case::trailing_space("r1 ")]
    #[case::blank("")]
    fn malformed_recipe_ids_are_invalid_requests(#[case] raw: &str) {
        let error = parse_recipe_id(raw.to_owned()).expect_err("malformed id");
        assert_eq!(error.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    fn well_formed_recipe_ids_parse() {
        let id = parse_recipe_id("r1".to_owned()).expect("valid id");
        assert_eq!(id.as_str(), "r1");
    }
}
