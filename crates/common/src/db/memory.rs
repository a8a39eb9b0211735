//! In-memory `ResearchStore` for pipeline tests
//!
//! Enforces the same per-project uniqueness on citations as the SQL schema and
//! lets tests inject failures at single-row granularity.

use crate::db::models::*;
use crate::db::store::{DocumentUpdate, ResearchStore};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    projects: Mutex<Vec<Project>>,
    chapters: Mutex<Vec<Chapter>>,
    citations: Mutex<Vec<Citation>>,
    documents: Mutex<Vec<GeneratedDocument>>,
    failing_titles: Mutex<HashSet<String>>,
    blind_lookups: Mutex<bool>,
    failing_completions: AtomicUsize,
    pub insert_attempts: AtomicUsize,
    pub chapter_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_project(&self, title: &str, description: Option<&str>, specialization: &str) -> Project {
        let now = Utc::now().into();
        let project = Project {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.map(str::to_string),
            specialization: specialization.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.projects.lock().unwrap().push(project.clone());
        project
    }

    pub fn seed_chapter(
        &self,
        project_id: Uuid,
        chapter_type: ChapterType,
        content: &str,
        status: ChapterStatus,
    ) -> Chapter {
        let now = Utc::now().into();
        let chapter = Chapter {
            id: Uuid::new_v4(),
            project_id,
            chapter_type: chapter_type.as_str().to_string(),
            title: chapter_type.as_str().replace('_', " "),
            content: content.to_string(),
            status: String::from(status),
            word_count: content.split_whitespace().count() as i32,
            created_at: now,
            updated_at: now,
        };
        self.chapters.lock().unwrap().push(chapter.clone());
        chapter
    }

    pub fn seed_document(&self, project_id: Uuid, created_at: DateTime<Utc>) -> GeneratedDocument {
        let document = GeneratedDocument {
            id: Uuid::new_v4(),
            project_id,
            file_name: None,
            file_path: None,
            status: String::from(DocumentStatus::Processing),
            status_message: None,
            created_at: created_at.into(),
            updated_at: created_at.into(),
        };
        self.documents.lock().unwrap().push(document.clone());
        document
    }

    /// Make inserts of citations with this title fail with a database error
    pub fn fail_inserts_for(&self, title: &str) {
        self.failing_titles.lock().unwrap().insert(title.to_string());
    }

    /// Make dedup lookups miss so a concurrent insert is only caught by the index
    pub fn blind_lookups(&self) {
        *self.blind_lookups.lock().unwrap() = true;
    }

    /// Fail the next `n` transitions to `completed`
    pub fn fail_completions(&self, n: usize) {
        self.failing_completions.store(n, Ordering::SeqCst);
    }

    pub fn citations(&self) -> Vec<Citation> {
        self.citations.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<GeneratedDocument> {
        self.documents.lock().unwrap().clone()
    }

    pub fn chapter(&self, id: Uuid) -> Option<Chapter> {
        self.chapters.lock().unwrap().iter().find(|c| c.id == id).cloned()
    }
}

#[async_trait]
impl ResearchStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>> {
        Ok(self.projects.lock().unwrap().iter().find(|p| p.id == id).cloned())
    }

    async fn find_chapter(&self, id: Uuid) -> Result<Option<Chapter>> {
        Ok(self.chapter(id))
    }

    async fn find_chapter_by_type(
        &self,
        project_id: Uuid,
        chapter_type: ChapterType,
    ) -> Result<Option<Chapter>> {
        Ok(self
            .chapters
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.project_id == project_id && c.chapter_type == chapter_type.as_str())
            .cloned())
    }

    async fn list_chapters(&self, project_id: Uuid) -> Result<Vec<Chapter>> {
        Ok(self
            .chapters
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn update_chapter_content(
        &self,
        chapter_id: Uuid,
        content: String,
        word_count: i32,
        status: ChapterStatus,
    ) -> Result<Chapter> {
        let mut chapters = self.chapters.lock().unwrap();
        let chapter = chapters
            .iter_mut()
            .find(|c| c.id == chapter_id)
            .ok_or_else(|| AppError::ChapterNotFound { id: chapter_id.to_string() })?;
        chapter.content = content;
        chapter.word_count = word_count;
        chapter.status = String::from(status);
        chapter.updated_at = Utc::now().into();
        self.chapter_writes.fetch_add(1, Ordering::SeqCst);
        Ok(chapter.clone())
    }

    async fn find_citation_by_doi(&self, project_id: Uuid, doi: &str) -> Result<Option<Citation>> {
        if *self.blind_lookups.lock().unwrap() {
            return Ok(None);
        }
        Ok(self
            .citations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.project_id == project_id && c.doi.as_deref() == Some(doi))
            .cloned())
    }

    async fn find_citation_by_external_id(
        &self,
        project_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Citation>> {
        if *self.blind_lookups.lock().unwrap() {
            return Ok(None);
        }
        Ok(self
            .citations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.project_id == project_id && c.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn insert_citation(&self, citation: NewCitation) -> Result<Citation> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);

        if self.failing_titles.lock().unwrap().contains(&citation.title) {
            return Err(AppError::Database(sea_orm::DbErr::Custom("disk full".into())));
        }

        let mut citations = self.citations.lock().unwrap();
        let clash = citations.iter().any(|c| {
            c.project_id == citation.project_id
                && ((citation.doi.is_some() && c.doi == citation.doi)
                    || (citation.external_id.is_some() && c.external_id == citation.external_id))
        });
        if clash {
            return Err(AppError::Duplicate {
                message: "citations_project_doi_key".into(),
            });
        }

        let row = Citation {
            id: Uuid::new_v4(),
            project_id: citation.project_id,
            title: citation.title,
            authors: citation.authors,
            journal: citation.journal,
            publication_year: citation.publication_year,
            doi: citation.doi,
            external_id: citation.external_id,
            abstract_text: citation.abstract_text,
            url: citation.url,
            source_api: citation.source_api,
            citation_apa: citation.citation_apa,
            citation_mla: None,
            created_at: Utc::now().into(),
        };
        citations.push(row.clone());
        Ok(row)
    }

    async fn list_citations(&self, project_id: Uuid) -> Result<Vec<Citation>> {
        Ok(self
            .citations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn create_document(&self, project_id: Uuid) -> Result<GeneratedDocument> {
        Ok(self.seed_document(project_id, Utc::now()))
    }

    async fn update_document_status(
        &self,
        document_id: Uuid,
        update: DocumentUpdate,
    ) -> Result<GeneratedDocument> {
        if matches!(update, DocumentUpdate::Completed { .. }) {
            let remaining = self.failing_completions.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_completions.store(remaining - 1, Ordering::SeqCst);
                return Err(AppError::DatabaseConnection {
                    message: "connection reset".into(),
                });
            }
        }

        let mut documents = self.documents.lock().unwrap();
        let document = documents
            .iter_mut()
            .find(|d| d.id == document_id)
            .ok_or_else(|| AppError::DocumentNotFound { id: document_id.to_string() })?;

        match update {
            DocumentUpdate::Completed { file_name, file_path } => {
                document.status = String::from(DocumentStatus::Completed);
                document.file_name = Some(file_name);
                document.file_path = Some(file_path);
                document.status_message = None;
            }
            DocumentUpdate::Failed { message } => {
                document.status = String::from(DocumentStatus::Failed);
                document.status_message = Some(message);
            }
        }
        document.updated_at = Utc::now().into();
        Ok(document.clone())
    }

    async fn list_stale_documents(&self, cutoff: DateTime<Utc>) -> Result<Vec<GeneratedDocument>> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.document_status() == DocumentStatus::Processing && d.created_at < cutoff)
            .cloned()
            .collect())
    }
}
