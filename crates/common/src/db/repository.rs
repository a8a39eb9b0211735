//! Repository pattern for database operations
//!
//! SeaORM implementation of [`ResearchStore`]. Each call is one statement
//! against one row; nothing here opens a transaction.

use crate::db::models::*;
use crate::db::store::{DocumentUpdate, ResearchStore};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

/// Map a unique index violation to `AppError::Duplicate`
fn map_insert_error(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(message)) => AppError::Duplicate { message },
        _ => AppError::Database(err),
    }
}

#[async_trait]
impl ResearchStore for Repository {
    // ========================================================================
    // Health Check
    // ========================================================================

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Project & Chapter Operations
    // ========================================================================

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>> {
        ProjectEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_chapter(&self, id: Uuid) -> Result<Option<Chapter>> {
        ChapterEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_chapter_by_type(
        &self,
        project_id: Uuid,
        chapter_type: ChapterType,
    ) -> Result<Option<Chapter>> {
        ChapterEntity::find()
            .filter(ChapterColumn::ProjectId.eq(project_id))
            .filter(ChapterColumn::ChapterType.eq(chapter_type.as_str()))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_chapters(&self, project_id: Uuid) -> Result<Vec<Chapter>> {
        ChapterEntity::find()
            .filter(ChapterColumn::ProjectId.eq(project_id))
            .order_by_asc(ChapterColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn update_chapter_content(
        &self,
        chapter_id: Uuid,
        content: String,
        word_count: i32,
        status: ChapterStatus,
    ) -> Result<Chapter> {
        let mut chapter: ChapterActiveModel = ChapterEntity::find_by_id(chapter_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::ChapterNotFound { id: chapter_id.to_string() })?
            .into();

        chapter.content = Set(content);
        chapter.word_count = Set(word_count);
        chapter.status = Set(String::from(status));
        chapter.updated_at = Set(Utc::now().into());

        chapter.update(self.write_conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Citation Operations
    // ========================================================================

    // Dedup lookups go to the primary so a citation inserted moments ago
    // is visible regardless of replica lag.
    async fn find_citation_by_doi(&self, project_id: Uuid, doi: &str) -> Result<Option<Citation>> {
        CitationEntity::find()
            .filter(CitationColumn::ProjectId.eq(project_id))
            .filter(CitationColumn::Doi.eq(doi))
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_citation_by_external_id(
        &self,
        project_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Citation>> {
        CitationEntity::find()
            .filter(CitationColumn::ProjectId.eq(project_id))
            .filter(CitationColumn::ExternalId.eq(external_id))
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_citation(&self, citation: NewCitation) -> Result<Citation> {
        let model = CitationActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(citation.project_id),
            title: Set(citation.title),
            authors: Set(citation.authors),
            journal: Set(citation.journal),
            publication_year: Set(citation.publication_year),
            doi: Set(citation.doi),
            external_id: Set(citation.external_id),
            abstract_text: Set(citation.abstract_text),
            url: Set(citation.url),
            source_api: Set(citation.source_api),
            citation_apa: Set(citation.citation_apa),
            citation_mla: Set(None),
            created_at: Set(Utc::now().into()),
        };

        model.insert(self.write_conn()).await.map_err(map_insert_error)
    }

    async fn list_citations(&self, project_id: Uuid) -> Result<Vec<Citation>> {
        CitationEntity::find()
            .filter(CitationColumn::ProjectId.eq(project_id))
            .order_by_asc(CitationColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Generated Document Operations
    // ========================================================================

    async fn create_document(&self, project_id: Uuid) -> Result<GeneratedDocument> {
        let now = Utc::now();

        let document = GeneratedDocumentActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            file_name: Set(None),
            file_path: Set(None),
            status: Set(String::from(DocumentStatus::Processing)),
            status_message: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        document.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn update_document_status(
        &self,
        document_id: Uuid,
        update: DocumentUpdate,
    ) -> Result<GeneratedDocument> {
        let mut document: GeneratedDocumentActiveModel =
            GeneratedDocumentEntity::find_by_id(document_id)
                .one(self.write_conn())
                .await?
                .ok_or_else(|| AppError::DocumentNotFound { id: document_id.to_string() })?
                .into();

        match update {
            DocumentUpdate::Completed { file_name, file_path } => {
                document.status = Set(String::from(DocumentStatus::Completed));
                document.file_name = Set(Some(file_name));
                document.file_path = Set(Some(file_path));
                document.status_message = Set(None);
            }
            DocumentUpdate::Failed { message } => {
                document.status = Set(String::from(DocumentStatus::Failed));
                document.status_message = Set(Some(message));
            }
        }
        document.updated_at = Set(Utc::now().into());

        document.update(self.write_conn()).await.map_err(Into::into)
    }

    async fn list_stale_documents(&self, cutoff: DateTime<Utc>) -> Result<Vec<GeneratedDocument>> {
        GeneratedDocumentEntity::find()
            .filter(GeneratedDocumentColumn::Status.eq(String::from(DocumentStatus::Processing)))
            .filter(GeneratedDocumentColumn::CreatedAt.lt(cutoff))
            .order_by_asc(GeneratedDocumentColumn::CreatedAt)
            .all(self.write_conn())
            .await
            .map_err(Into::into)
    }
}
