//! Chapter generation handler

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::AppState;
use thesisforge_common::{
    errors::Result,
    generation::chapters::{ChapterOutcome, ChapterRequest},
};

/// Generate content for one chapter of a project.
///
/// The body is optional; introduction and methodology chapters need no
/// paper selection. Shutdown cancels the call through a child token.
pub async fn generate_chapter(
    State(state): State<AppState>,
    Path((project_id, chapter_id)): Path<(Uuid, Uuid)>,
    request: Option<Json<ChapterRequest>>,
) -> Result<Json<ChapterOutcome>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let cancel = state.shutdown.child_token();

    let outcome = state
        .chapters
        .generate_chapter(project_id, chapter_id, request, &cancel)
        .await?;

    Ok(Json(outcome))
}
