//! Document assembly handoff
//!
//! Gathers renderable chapters and formatted references, sends them to the
//! external renderer and tracks the outcome on a generated-document record.
//! The record is created in `processing` before the renderer is called and
//! always ends `completed` or `failed`; records orphaned by a crash are
//! failed by [`DocumentAssembler::sweep_stale`].

use crate::config::{GenerationConfig, RendererConfig};
use crate::db::models::{Chapter, Citation, GeneratedDocument, Project};
use crate::db::{DocumentUpdate, ResearchStore};
use crate::errors::{AppError, Result};
use crate::generation::cancellable;
use crate::metrics;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Longest diagnostic stored on a failed document
const MAX_STATUS_MESSAGE: usize = 200;

const STALE_MESSAGE: &str = "renderer did not report a result in time";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RenderChapter {
    #[serde(rename = "type")]
    pub chapter_type: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RenderReference {
    pub citation_apa: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FormattingOptions {
    pub font_family: String,
    pub font_size_main: u32,
    pub line_spacing: f32,
}

/// Body sent to the renderer
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RenderPayload {
    pub project_id: Uuid,
    pub research_title: String,
    pub student_name: String,
    pub university_name: String,
    pub specialization: String,
    pub chapters: Vec<RenderChapter>,
    pub references: Vec<RenderReference>,
    pub formatting_options: FormattingOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderResponse {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render the document, returning the produced file name
    async fn render(&self, payload: &RenderPayload) -> Result<String>;
}

/// Renderer service reached over HTTP
pub struct HttpRenderer {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRenderer {
    pub fn new(config: &RendererConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl DocumentRenderer for HttpRenderer {
    async fn render(&self, payload: &RenderPayload) -> Result<String> {
        let url = format!("{}/generate-document", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::Render {
                message: if e.is_timeout() {
                    format!("renderer timed out after {}s", self.timeout.as_secs())
                } else {
                    format!("renderer unreachable: {}", e)
                },
            })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::ACCEPTED {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Render {
                message: format!("renderer returned {}: {}", status.as_u16(), text),
            });
        }

        let body: RenderResponse = response.json().await.map_err(|e| AppError::Render {
            message: format!("invalid renderer response: {}", e),
        })?;

        body.file_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::Render {
                message: format!(
                    "renderer response has no file name{}",
                    body.message.map(|m| format!(": {}", m)).unwrap_or_default()
                ),
            })
    }
}

/// First `MAX_STATUS_MESSAGE` characters of an error, for the status column
pub fn short_message(err: &AppError) -> String {
    let text = err.to_string();
    match text.char_indices().nth(MAX_STATUS_MESSAGE) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text,
    }
}

/// Chapters in canonical thesis order; drafts and unknown types are left out
pub fn renderable_chapters(chapters: Vec<Chapter>) -> Vec<RenderChapter> {
    let mut ready: Vec<_> = chapters
        .into_iter()
        .filter(Chapter::is_renderable)
        .filter_map(|c| c.kind().map(|kind| (kind.ordinal(), c)))
        .collect();
    ready.sort_by_key(|(ordinal, _)| *ordinal);

    ready
        .into_iter()
        .map(|(_, c)| RenderChapter {
            chapter_type: c.chapter_type,
            title: c.title,
            content: c.content,
        })
        .collect()
}

fn references(citations: Vec<Citation>) -> Vec<RenderReference> {
    citations
        .into_iter()
        .filter_map(|c| c.citation_apa.filter(|apa| !apa.trim().is_empty()))
        .map(|citation_apa| RenderReference { citation_apa })
        .collect()
}

pub struct DocumentAssembler {
    store: Arc<dyn ResearchStore>,
    renderer: Arc<dyn DocumentRenderer>,
    config: RendererConfig,
    status_retry: Duration,
}

impl DocumentAssembler {
    pub fn new(
        store: Arc<dyn ResearchStore>,
        renderer: Arc<dyn DocumentRenderer>,
        config: &RendererConfig,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            store,
            renderer,
            config: config.clone(),
            status_retry: Duration::from_secs(generation.status_retry_secs),
        }
    }

    async fn build_payload(&self, project: &Project) -> Result<RenderPayload> {
        let chapters = self.store.list_chapters(project.id).await?;
        let citations = self.store.list_citations(project.id).await?;

        Ok(RenderPayload {
            project_id: project.id,
            research_title: project.title.clone(),
            student_name: self.config.student_name.clone(),
            university_name: self.config.university_name.clone(),
            specialization: project.specialization.clone(),
            chapters: renderable_chapters(chapters),
            references: references(citations),
            formatting_options: FormattingOptions {
                font_family: self.config.font_family.clone(),
                font_size_main: self.config.font_size_main,
                line_spacing: self.config.line_spacing,
            },
        })
    }

    /// Render `project_id` into a document.
    ///
    /// A new record is created for every call. Renderer failure and
    /// cancellation both end the record `failed` and surface the error.
    #[instrument(skip(self, cancel), fields(project_id = %project_id))]
    pub async fn assemble(
        &self,
        project_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<GeneratedDocument> {
        let project = self
            .store
            .find_project(project_id)
            .await?
            .ok_or_else(|| AppError::ProjectNotFound { id: project_id.to_string() })?;

        let document = self.store.create_document(project.id).await?;
        info!(document_id = %document.id, "Document record created");

        let start = Instant::now();
        let rendered = cancellable(cancel, async {
            let payload = self.build_payload(&project).await?;
            info!(
                document_id = %document.id,
                chapters = payload.chapters.len(),
                references = payload.references.len(),
                "Sending document to renderer"
            );
            self.renderer.render(&payload).await
        })
        .await;

        let file_name = match rendered {
            Ok(file_name) => file_name,
            Err(e) => {
                let message = if matches!(e, AppError::Cancelled) {
                    "cancelled".to_string()
                } else {
                    metrics::record_render(start.elapsed().as_secs_f64(), false);
                    short_message(&e)
                };
                warn!(document_id = %document.id, error = %e, "Document generation failed");
                self.mark_failed(document.id, message).await;
                return Err(e);
            }
        };

        metrics::record_render(start.elapsed().as_secs_f64(), true);
        let file_path = format!("{}/{}", self.config.output_dir.trim_end_matches('/'), file_name);
        self.mark_completed(document, file_name, file_path).await
    }

    async fn mark_failed(&self, document_id: Uuid, message: String) {
        if let Err(e) = self
            .store
            .update_document_status(document_id, DocumentUpdate::Failed { message })
            .await
        {
            error!(document_id = %document_id, error = %e, "Failed to mark document failed");
        }
    }

    /// Record completion, retrying transient write errors. If every attempt
    /// fails the record stays `processing` for the sweep to pick up.
    async fn mark_completed(
        &self,
        document: GeneratedDocument,
        file_name: String,
        file_path: String,
    ) -> Result<GeneratedDocument> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(self.status_retry),
            ..ExponentialBackoff::default()
        };

        let update = DocumentUpdate::Completed {
            file_name: file_name.clone(),
            file_path: file_path.clone(),
        };

        let store = &self.store;
        let document_id = document.id;
        let outcome = retry(policy, move || {
            let update = update.clone();
            async move {
                store
                    .update_document_status(document_id, update)
                    .await
                    .map_err(|e| {
                        warn!(document_id = %document_id, error = %e, "Completion write failed, retrying");
                        backoff::Error::transient(e)
                    })
            }
        })
        .await;

        match outcome {
            Ok(updated) => {
                info!(document_id = %updated.id, file_name = %file_name, "Document completed");
                Ok(updated)
            }
            Err(e) => {
                error!(
                    document_id = %document.id,
                    file_name = %file_name,
                    error = %e,
                    "Document rendered but completion could not be recorded"
                );
                Ok(document)
            }
        }
    }

    /// Fail every `processing` record older than `max_age`
    #[instrument(skip(self))]
    pub async fn sweep_stale(&self, max_age: Duration) -> Result<usize> {
        let age = chrono::Duration::from_std(max_age).map_err(|e| AppError::Internal {
            message: format!("Invalid stale document age: {}", e),
        })?;
        let cutoff = chrono::Utc::now() - age;

        let stale = self.store.list_stale_documents(cutoff).await?;
        let mut swept = 0;
        for document in stale {
            match self
                .store
                .update_document_status(
                    document.id,
                    DocumentUpdate::Failed {
                        message: STALE_MESSAGE.to_string(),
                    },
                )
                .await
            {
                Ok(_) => swept += 1,
                Err(e) => warn!(document_id = %document.id, error = %e, "Failed to sweep stale document"),
            }
        }

        if swept > 0 {
            info!(swept, "Stale documents marked failed");
        }
        Ok(swept)
    }

    /// Sweep on a fixed interval until `shutdown` fires
    pub async fn run_sweeper(&self, interval: Duration, max_age: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Stale document sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_stale(max_age).await {
                        warn!(error = %e, "Stale document sweep failed");
                    }
                }
            }
        }
    }
}
