//! Paper search handler

use axum::{extract::State, Json};
use serde::Serialize;
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use thesisforge_common::{
    errors::Result,
    sources::{SearchQuery, SourcePaper},
};

/// Search response
#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total_results: usize,
    pub papers: Vec<SourcePaper>,
    pub processing_time_ms: u64,
}

/// Search the paper source for candidate papers
pub async fn search(
    State(state): State<AppState>,
    Json(query): Json<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    query.validate()?;

    let start = Instant::now();
    let papers = state.sources.search(&query).await?;

    tracing::info!(
        query = %query.query,
        results = papers.len(),
        "Paper search completed"
    );

    Ok(Json(SearchResponse {
        query: query.query,
        total_results: papers.len(),
        papers,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
