//! Storage seam for the generation pipeline
//!
//! Every method is a single-row read or write. The pipeline never opens a
//! transaction spanning an invocation: a failed section must not roll back
//! citations that were already reconciled for another.

use crate::db::models::{
    Chapter, ChapterStatus, ChapterType, Citation, GeneratedDocument, NewCitation, Project,
};
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Terminal transition for a generated document record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentUpdate {
    Completed { file_name: String, file_path: String },
    Failed { message: String },
}

#[async_trait]
pub trait ResearchStore: Send + Sync {
    /// Check that the backing store is reachable
    async fn ping(&self) -> Result<()>;

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>>;

    async fn find_chapter(&self, id: Uuid) -> Result<Option<Chapter>>;

    async fn find_chapter_by_type(
        &self,
        project_id: Uuid,
        chapter_type: ChapterType,
    ) -> Result<Option<Chapter>>;

    async fn list_chapters(&self, project_id: Uuid) -> Result<Vec<Chapter>>;

    /// Replace a chapter's content and status, recording the word count
    async fn update_chapter_content(
        &self,
        chapter_id: Uuid,
        content: String,
        word_count: i32,
        status: ChapterStatus,
    ) -> Result<Chapter>;

    async fn find_citation_by_doi(&self, project_id: Uuid, doi: &str) -> Result<Option<Citation>>;

    async fn find_citation_by_external_id(
        &self,
        project_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Citation>>;

    /// Insert a citation. A uniqueness violation surfaces as `AppError::Duplicate`.
    async fn insert_citation(&self, citation: NewCitation) -> Result<Citation>;

    async fn list_citations(&self, project_id: Uuid) -> Result<Vec<Citation>>;

    /// Create a fresh document record in `processing`
    async fn create_document(&self, project_id: Uuid) -> Result<GeneratedDocument>;

    async fn update_document_status(
        &self,
        document_id: Uuid,
        update: DocumentUpdate,
    ) -> Result<GeneratedDocument>;

    /// Documents still `processing` that were created before `cutoff`
    async fn list_stale_documents(&self, cutoff: DateTime<Utc>) -> Result<Vec<GeneratedDocument>>;
}
