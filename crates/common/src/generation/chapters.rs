//! Chapter generation
//!
//! Chapter types dispatch through a [`ChapterRegistry`]; adding a chapter
//! type means registering a [`ChapterGenerator`], not editing the service.
//! [`ChapterService`] owns the surrounding steps: load and check the
//! project and chapter, generate, reconcile citations, save.

use crate::config::GenerationConfig;
use crate::db::models::{Chapter, ChapterStatus, ChapterType, Project};
use crate::db::ResearchStore;
use crate::errors::{AppError, Result};
use crate::generation::citations::{CitationReconciler, ReconciliationReport};
use crate::generation::context_chain::{ContextChain, IntroductionContext, ResearchType};
use crate::generation::review::{ReviewOrchestrator, UsedPapers};
use crate::generation::{cancellable, word_count};
use crate::llm::{ChatRequest, LanguageModel};
use crate::metrics;
use crate::sources::{PaperSource, SourcePaper};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Caller input for one generation call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChapterRequest {
    /// Paper identifiers to resolve through the paper source
    #[serde(default)]
    pub selected_paper_ids: Vec<String>,

    /// Papers the caller already holds, used as-is
    #[serde(default)]
    pub selected_papers: Vec<SourcePaper>,
}

/// Everything a generator needs for one call, passed explicitly
pub struct GenerationContext<'a> {
    pub project: &'a Project,
    pub request: &'a ChapterRequest,
    pub cancel: &'a CancellationToken,
}

/// Generator output
#[derive(Debug, Clone, Default)]
pub struct GeneratedChapter {
    pub content: String,
    /// Papers to reconcile into citations
    pub used_papers: Vec<SourcePaper>,
    /// Sections replaced by an inline failure marker
    pub failed_sections: Vec<String>,
}

#[async_trait]
pub trait ChapterGenerator: Send + Sync {
    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratedChapter>;
}

/// Strategy table from chapter type to generator
#[derive(Default, Clone)]
pub struct ChapterRegistry {
    generators: HashMap<ChapterType, Arc<dyn ChapterGenerator>>,
}

impl ChapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the literature review, introduction and methodology generators
    pub fn standard(
        model: Arc<dyn LanguageModel>,
        source: Arc<dyn PaperSource>,
        store: Arc<dyn ResearchStore>,
        config: &GenerationConfig,
    ) -> Self {
        Self::new()
            .register(
                ChapterType::LiteratureReview,
                Arc::new(LiteratureReviewGenerator::new(
                    ReviewOrchestrator::new(model.clone(), config),
                    source,
                )),
            )
            .register(
                ChapterType::Introduction,
                Arc::new(IntroductionGenerator::new(
                    model.clone(),
                    ContextChain::new(store, config.intro_context_chars),
                )),
            )
            .register(ChapterType::Methodology, Arc::new(MethodologyGenerator::new(model)))
    }

    pub fn register(mut self, chapter_type: ChapterType, generator: Arc<dyn ChapterGenerator>) -> Self {
        self.generators.insert(chapter_type, generator);
        self
    }

    pub fn get(&self, chapter_type: ChapterType) -> Option<Arc<dyn ChapterGenerator>> {
        self.generators.get(&chapter_type).cloned()
    }

    pub fn supports(&self, chapter_type: ChapterType) -> bool {
        self.generators.contains_key(&chapter_type)
    }
}

// ============================================================================
// Literature review
// ============================================================================

pub struct LiteratureReviewGenerator {
    orchestrator: ReviewOrchestrator,
    source: Arc<dyn PaperSource>,
}

impl LiteratureReviewGenerator {
    pub fn new(orchestrator: ReviewOrchestrator, source: Arc<dyn PaperSource>) -> Self {
        Self { orchestrator, source }
    }

    /// Inline papers first, then ids fetched from the source. Papers that
    /// cannot be fetched are skipped.
    async fn resolve_selection(
        &self,
        request: &ChapterRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourcePaper>> {
        let mut selected = UsedPapers::new();
        selected.extend(&request.selected_papers);

        for id in &request.selected_paper_ids {
            let id = id.trim();
            if id.is_empty() || selected.contains(id) {
                continue;
            }
            match cancellable(cancel, self.source.fetch_paper(id)).await {
                Ok(paper) => {
                    selected.insert(&paper);
                }
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => warn!(paper_id = %id, error = %e, "Selected paper could not be fetched, skipping"),
            }
        }

        Ok(selected.into_vec())
    }
}

#[async_trait]
impl ChapterGenerator for LiteratureReviewGenerator {
    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratedChapter> {
        let papers = self.resolve_selection(ctx.request, ctx.cancel).await?;
        if papers.is_empty() {
            return Err(AppError::NoPapersSelected);
        }

        let review = self
            .orchestrator
            .generate(&ctx.project.title, &papers, ctx.cancel)
            .await?;

        Ok(GeneratedChapter {
            content: review.content,
            used_papers: review.used_papers,
            failed_sections: review.failed_themes,
        })
    }
}

// ============================================================================
// Introduction
// ============================================================================

pub struct IntroductionGenerator {
    model: Arc<dyn LanguageModel>,
    chain: ContextChain,
}

impl IntroductionGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, chain: ContextChain) -> Self {
        Self { model, chain }
    }

    pub fn build_prompt(project: &Project, context: &IntroductionContext) -> String {
        let themes = if context.key_themes.is_empty() {
            "A comprehensive literature review was conducted.".to_string()
        } else {
            let mut s = String::from("Key themes identified in the literature include:\n");
            for theme in &context.key_themes {
                s.push_str(&format!("- {}\n", theme));
            }
            s
        };

        format!(
            "Write the introduction chapter (target 800-1200 words) for a research thesis.\n\n\
            Thesis title: \"{}\"\n\
            Specialization: {}\n\n\
            Context from the literature review:\n{}\n\n{}\n\
            Use these Markdown sections:\n\
            ## Background of the Study\n\
            ## Problem Statement\n\
            ## Research Questions and Objectives\n\
            ## Significance of the Study\n\
            ## Scope and Limitations\n\
            ## Structure of the Thesis\n\n\
            Keep an academic tone. Draw on the literature context for general concepts only; \
            do not invent specific paper citations that are not in the context.",
            project.title, project.specialization, context.literature_summary, themes
        )
    }
}

#[async_trait]
impl ChapterGenerator for IntroductionGenerator {
    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratedChapter> {
        let context = self.chain.introduction_context(ctx.project.id).await?;

        let request = ChatRequest::new("introduction")
            .system("You are an expert academic writer specializing in thesis introductions.")
            .user(Self::build_prompt(ctx.project, &context))
            .max_tokens(2000)
            .temperature(0.7);

        let content = cancellable(ctx.cancel, self.model.complete(&request)).await?;
        Ok(GeneratedChapter {
            content,
            ..GeneratedChapter::default()
        })
    }
}

// ============================================================================
// Methodology
// ============================================================================

pub struct MethodologyGenerator {
    model: Arc<dyn LanguageModel>,
}

impl MethodologyGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn build_prompt(project: &Project, research_type: ResearchType) -> String {
        format!(
            "Write a methodology chapter template for a research thesis.\n\n\
            Thesis title: \"{}\"\n\
            Specialization: {}\n\
            Research approach: {}\n\n\
            Cover these sections:\n\
            1. Research Design\n\
            2. Population and Sampling\n\
            3. Data Collection Methods and Instruments\n\
            4. Data Analysis Procedures\n\
            5. Ethical Considerations\n\
            6. Validity and Reliability (Trustworthiness for qualitative work)\n\n\
            Give guidance suited to the research approach and leave bracketed placeholders such as \
            [Describe the specific research design here] for the student to complete. \
            Target 500-800 words.",
            project.title,
            project.specialization,
            research_type.label()
        )
    }
}

#[async_trait]
impl ChapterGenerator for MethodologyGenerator {
    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratedChapter> {
        let research_type = ContextChain::methodology_context(ctx.project);

        let request = ChatRequest::new("methodology")
            .system("You are an expert in research methodology who writes structured templates.")
            .user(Self::build_prompt(ctx.project, research_type))
            .max_tokens(1500)
            .temperature(0.5);

        let content = cancellable(ctx.cancel, self.model.complete(&request)).await?;
        Ok(GeneratedChapter {
            content,
            ..GeneratedChapter::default()
        })
    }
}

// ============================================================================
// Service
// ============================================================================

/// Result of one chapter generation call
#[derive(Debug, Clone, Serialize)]
pub struct ChapterOutcome {
    pub chapter: Chapter,
    pub citations: Option<ReconciliationReport>,
    pub failed_sections: Vec<String>,
}

pub struct ChapterService {
    store: Arc<dyn ResearchStore>,
    registry: ChapterRegistry,
    reconciler: CitationReconciler,
}

impl ChapterService {
    pub fn new(store: Arc<dyn ResearchStore>, registry: ChapterRegistry) -> Self {
        Self {
            reconciler: CitationReconciler::new(store.clone()),
            store,
            registry,
        }
    }

    /// Generate content for one chapter and save it with status `generated`.
    ///
    /// Citations for used papers are reconciled before the chapter write. A
    /// cancellation observed before the write leaves the chapter untouched.
    #[instrument(skip(self, request, cancel), fields(project_id = %project_id, chapter_id = %chapter_id))]
    pub async fn generate_chapter(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
        request: ChapterRequest,
        cancel: &CancellationToken,
    ) -> Result<ChapterOutcome> {
        let project = self
            .store
            .find_project(project_id)
            .await?
            .ok_or_else(|| AppError::ProjectNotFound { id: project_id.to_string() })?;

        let chapter = self
            .store
            .find_chapter(chapter_id)
            .await?
            .filter(|c| c.project_id == project.id)
            .ok_or_else(|| AppError::ChapterNotFound { id: chapter_id.to_string() })?;

        let unsupported = || AppError::UnsupportedChapterType {
            chapter_type: chapter.chapter_type.clone(),
        };
        let kind = chapter.kind().ok_or_else(unsupported)?;
        let generator = self.registry.get(kind).ok_or_else(unsupported)?;

        info!(chapter_type = %kind, "Generating chapter");

        let ctx = GenerationContext {
            project: &project,
            request: &request,
            cancel,
        };
        let generated = generator.generate(&ctx).await?;

        let citations = if generated.used_papers.is_empty() {
            None
        } else {
            Some(
                self.reconciler
                    .reconcile(project.id, &generated.used_papers, cancel)
                    .await?,
            )
        };

        if cancel.is_cancelled() {
            warn!("Generation cancelled before chapter save");
            return Err(AppError::Cancelled);
        }

        let words = i32::try_from(word_count(&generated.content)).unwrap_or(i32::MAX);
        let saved = self
            .store
            .update_chapter_content(chapter.id, generated.content, words, ChapterStatus::Generated)
            .await?;

        metrics::record_chapter_generated(kind.as_str());
        info!(
            chapter_type = %kind,
            word_count = words,
            failed_sections = generated.failed_sections.len(),
            "Chapter saved"
        );

        Ok(ChapterOutcome {
            chapter: saved,
            citations,
            failed_sections: generated.failed_sections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::generation::testing::{papers, themes_json, ScriptedModel, StaticSource};
    use crate::generation::{synthesis, themes};
    use std::sync::atomic::Ordering;

    struct Fixture {
        store: Arc<MemoryStore>,
        model: Arc<ScriptedModel>,
        service: ChapterService,
        project: Project,
    }

    fn fixture(model: ScriptedModel, description: Option<&str>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(model);
        let source = Arc::new(StaticSource { papers: papers(&["p1", "p2", "p3", "p4"]) });
        let registry = ChapterRegistry::standard(
            model.clone(),
            source,
            store.clone(),
            &GenerationConfig::default(),
        );
        let project = store.seed_project("Remote Work and Wellbeing", description, "Psychology");
        Fixture {
            service: ChapterService::new(store.clone(), registry),
            store,
            model,
            project,
        }
    }

    fn themed_model() -> ScriptedModel {
        ScriptedModel::new(|req| match req.stage {
            themes::STAGE => Ok(themes_json(&[("Isolation", &["p1", "p2"]), ("Autonomy", &["p3"])])),
            synthesis::STAGE => Ok("Section prose with (Author, 2022).".into()),
            other => Ok(format!("{} chapter text.", other)),
        })
    }

    #[tokio::test]
    async fn test_literature_review_end_to_end() {
        let f = fixture(themed_model(), None);
        let chapter = f.store.seed_chapter(f.project.id, ChapterType::LiteratureReview, "", ChapterStatus::Draft);

        let request = ChapterRequest {
            selected_paper_ids: vec!["p1".into(), "p2".into(), "missing".into()],
            selected_papers: papers(&["p3"]),
        };
        let outcome = f
            .service
            .generate_chapter(f.project.id, chapter.id, request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.chapter.chapter_status(), ChapterStatus::Generated);
        assert!(outcome.chapter.content.contains("## Isolation"));
        assert!(outcome.chapter.word_count > 0);
        assert_eq!(outcome.citations.unwrap().inserted, 3);
        assert_eq!(f.store.citations().len(), 3);
    }

    #[tokio::test]
    async fn test_introduction_uses_review_context() {
        let f = fixture(themed_model(), None);
        f.store.seed_chapter(
            f.project.id,
            ChapterType::LiteratureReview,
            "\n## Isolation\n\nRemote staff report loneliness. More text follows here.",
            ChapterStatus::Generated,
        );
        let intro = f.store.seed_chapter(f.project.id, ChapterType::Introduction, "", ChapterStatus::Draft);

        let outcome = f
            .service
            .generate_chapter(f.project.id, intro.id, ChapterRequest::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.chapter.content, "introduction chapter text.");
        assert!(outcome.citations.is_none());
        let calls = f.model.calls_for("introduction");
        assert!(calls[0].prompt().contains("Remote staff report loneliness."));
        assert!(calls[0].prompt().contains("- Isolation"));
        assert_eq!(calls[0].max_tokens, 2000);
    }

    #[tokio::test]
    async fn test_methodology_uses_research_type() {
        let f = fixture(themed_model(), Some("A qualitative interview study"));
        let chapter = f.store.seed_chapter(f.project.id, ChapterType::Methodology, "", ChapterStatus::Draft);

        f.service
            .generate_chapter(f.project.id, chapter.id, ChapterRequest::default(), &CancellationToken::new())
            .await
            .unwrap();

        let calls = f.model.calls_for("methodology");
        assert!(calls[0].prompt().contains("Research approach: Qualitative Research"));
        assert!((calls[0].temperature - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_unregistered_type_is_rejected() {
        let f = fixture(themed_model(), None);
        let chapter = f.store.seed_chapter(f.project.id, ChapterType::Results, "", ChapterStatus::Draft);

        let result = f
            .service
            .generate_chapter(f.project.id, chapter.id, ChapterRequest::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AppError::UnsupportedChapterType { .. })));
    }

    #[tokio::test]
    async fn test_chapter_of_other_project_is_not_found() {
        let f = fixture(themed_model(), None);
        let other = f.store.seed_project("Other", None, "Law");
        let chapter = f.store.seed_chapter(other.id, ChapterType::Methodology, "", ChapterStatus::Draft);

        let result = f
            .service
            .generate_chapter(f.project.id, chapter.id, ChapterRequest::default(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AppError::ChapterNotFound { .. })));
    }

    #[tokio::test]
    async fn test_no_resolvable_papers_is_rejected() {
        let f = fixture(themed_model(), None);
        let chapter = f.store.seed_chapter(f.project.id, ChapterType::LiteratureReview, "", ChapterStatus::Draft);

        let request = ChapterRequest {
            selected_paper_ids: vec!["ghost".into()],
            ..ChapterRequest::default()
        };
        let result = f
            .service
            .generate_chapter(f.project.id, chapter.id, request, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AppError::NoPapersSelected)));
        assert_eq!(f.store.chapter_writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_leaves_chapter_untouched() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let model = ScriptedModel::new(move |req| {
            if req.stage == synthesis::STAGE {
                trigger.cancel();
            }
            match req.stage {
                themes::STAGE => Ok(themes_json(&[("Isolation", &["p1"])])),
                _ => Ok("Prose.".into()),
            }
        });
        let f = fixture(model, None);
        let chapter = f.store.seed_chapter(f.project.id, ChapterType::LiteratureReview, "old", ChapterStatus::Draft);

        let request = ChapterRequest {
            selected_papers: papers(&["p1"]),
            ..ChapterRequest::default()
        };
        let result = f.service.generate_chapter(f.project.id, chapter.id, request, &cancel).await;

        assert!(matches!(result, Err(AppError::Cancelled)));
        let stored = f.store.chapter(chapter.id).unwrap();
        assert_eq!(stored.content, "old");
        assert_eq!(stored.chapter_status(), ChapterStatus::Draft);
        assert!(f.store.citations().is_empty());
    }

    #[test]
    fn test_standard_registry_types() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel::new(|_| Ok(String::new())));
        let source = Arc::new(StaticSource { papers: Vec::new() });
        let registry = ChapterRegistry::standard(model, source, store, &GenerationConfig::default());
        assert!(registry.supports(ChapterType::LiteratureReview));
        assert!(registry.supports(ChapterType::Introduction));
        assert!(registry.supports(ChapterType::Methodology));
        assert!(!registry.supports(ChapterType::Conclusion));
    }
}
