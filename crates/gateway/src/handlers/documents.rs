//! Document assembly handler

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use thesisforge_common::{db::models::GeneratedDocument, errors::Result};

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status: String,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub status_message: Option<String>,
    pub created_at: String,
}

impl From<GeneratedDocument> for DocumentResponse {
    fn from(document: GeneratedDocument) -> Self {
        Self {
            id: document.id,
            project_id: document.project_id,
            status: document.status,
            file_name: document.file_name,
            file_path: document.file_path,
            status_message: document.status_message,
            created_at: document.created_at.to_rfc3339(),
        }
    }
}

/// Render the project's finished chapters into a document
pub async fn create_document(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    let cancel = state.shutdown.child_token();
    let document = state.assembler.assemble(project_id, &cancel).await?;

    tracing::info!(
        project_id = %project_id,
        document_id = %document.id,
        status = %document.status,
        "Document assembly finished"
    );

    Ok((StatusCode::CREATED, Json(document.into())))
}
