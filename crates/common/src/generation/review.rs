//! Review orchestrator
//!
//! Drives clustering, then per-theme synthesis, then aggregation into one
//! literature review, tracking which papers ended up in a successful section.
//!
//! Failure policy:
//! - clustering failure or zero themes: one fallback section over all papers
//! - unresolvable paper id: dropped with a warning
//! - theme with no resolvable papers: skipped
//! - one theme's synthesis fails: inline marker, the other themes continue
//! - cancellation: the whole run stops with `AppError::Cancelled`

use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use crate::generation::cancellable;
use crate::generation::synthesis::SectionSynthesizer;
use crate::generation::themes::{Theme, ThemeClusterer};
use crate::llm::LanguageModel;
use crate::metrics;
use crate::sources::SourcePaper;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Heading used when no themes could be identified
pub const FALLBACK_HEADING: &str = "Comprehensive Literature Summary";

/// Inline marker written in place of a section whose synthesis failed
pub fn failure_marker(theme: &str) -> String {
    format!("[Error generating content for theme: {}]", theme)
}

/// Insertion-ordered set of papers keyed by external identifier
#[derive(Debug, Clone, Default)]
pub struct UsedPapers {
    seen: HashSet<String>,
    papers: Vec<SourcePaper>,
}

impl UsedPapers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a paper; returns false if its identifier was already present
    pub fn insert(&mut self, paper: &SourcePaper) -> bool {
        if self.seen.insert(paper.external_id.clone()) {
            self.papers.push(paper.clone());
            true
        } else {
            false
        }
    }

    pub fn extend<'a>(&mut self, papers: impl IntoIterator<Item = &'a SourcePaper>) {
        for paper in papers {
            self.insert(paper);
        }
    }

    pub fn contains(&self, external_id: &str) -> bool {
        self.seen.contains(external_id)
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourcePaper> {
        self.papers.iter()
    }

    pub fn into_vec(self) -> Vec<SourcePaper> {
        self.papers
    }
}

/// Output of one literature review run
#[derive(Debug, Clone)]
pub struct LiteratureReview {
    /// Assembled Markdown text
    pub content: String,
    /// Papers used in at least one successful section, in first-use order
    pub used_papers: Vec<SourcePaper>,
    /// Themes the clustering stage returned (empty on the fallback path)
    pub themes: Vec<Theme>,
    /// Whether the single-section fallback produced the content
    pub fallback: bool,
    /// Themes whose synthesis failed and were replaced by a marker
    pub failed_themes: Vec<String>,
}

/// A theme whose member ids resolved to at least one selected paper
struct SectionPlan<'a> {
    theme: &'a Theme,
    papers: Vec<SourcePaper>,
}

pub struct ReviewOrchestrator {
    clusterer: ThemeClusterer,
    synthesizer: SectionSynthesizer,
    section_word_count: u32,
    concurrency: usize,
}

impl ReviewOrchestrator {
    pub fn new(model: Arc<dyn LanguageModel>, config: &GenerationConfig) -> Self {
        Self {
            clusterer: ThemeClusterer::new(model.clone(), config.max_themes),
            synthesizer: SectionSynthesizer::new(model),
            section_word_count: config.section_word_count,
            concurrency: config.synthesis_concurrency.max(1),
        }
    }

    /// Generate a literature review over `papers`
    #[instrument(skip_all, fields(title = %title, papers = papers.len()))]
    pub async fn generate(
        &self,
        title: &str,
        papers: &[SourcePaper],
        cancel: &CancellationToken,
    ) -> Result<LiteratureReview> {
        if papers.is_empty() {
            return Err(AppError::NoPapersSelected);
        }

        let themes = match cancellable(cancel, self.clusterer.identify_themes(title, papers)).await {
            Ok(themes) => themes,
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Theme clustering failed, treating as no themes");
                Vec::new()
            }
        };

        if themes.is_empty() {
            info!("No themes identified, generating a single summary section");
            return self.generate_fallback(title, papers, cancel).await;
        }

        let plans = resolve_themes(&themes, papers);
        if plans.is_empty() {
            warn!(themes = themes.len(), "No theme resolved to a selected paper, falling back");
            return self.generate_fallback(title, papers, cancel).await;
        }

        // Built up front: a stream over a borrowing closure is not Send.
        let sections: Vec<_> = plans
            .iter()
            .map(|plan| {
                cancellable(
                    cancel,
                    self.synthesizer.synthesize(
                        title,
                        &plan.theme.name,
                        &plan.papers,
                        self.section_word_count,
                    ),
                )
            })
            .collect();
        let outcomes: Vec<Result<String>> = stream::iter(sections)
            .buffered(self.concurrency)
            .collect()
            .await;

        if cancel.is_cancelled() || outcomes.iter().any(|o| matches!(o, Err(AppError::Cancelled))) {
            return Err(AppError::Cancelled);
        }

        let mut content = String::new();
        let mut used = UsedPapers::new();
        let mut failed_themes = Vec::new();

        for (plan, outcome) in plans.iter().zip(outcomes) {
            content.push_str(&format!("\n## {}\n\n", plan.theme.name));
            let description = plan.theme.description.trim();
            if !description.is_empty() {
                content.push_str(&format!("{}\n\n", description));
            }

            match outcome {
                Ok(prose) => {
                    content.push_str(&prose);
                    content.push_str("\n\n");
                    used.extend(&plan.papers);
                    metrics::record_section("generated");
                }
                Err(e) => {
                    warn!(theme = %plan.theme.name, error = %e, "Section synthesis failed, inserting marker");
                    content.push_str(&failure_marker(&plan.theme.name));
                    content.push_str("\n\n");
                    failed_themes.push(plan.theme.name.clone());
                    metrics::record_section("failed");
                }
            }
        }

        info!(
            sections = plans.len(),
            failed = failed_themes.len(),
            used_papers = used.len(),
            "Literature review assembled"
        );

        Ok(LiteratureReview {
            content,
            used_papers: used.into_vec(),
            themes,
            fallback: false,
            failed_themes,
        })
    }

    /// One synthesis call over every selected paper with a proportionally larger target
    async fn generate_fallback(
        &self,
        title: &str,
        papers: &[SourcePaper],
        cancel: &CancellationToken,
    ) -> Result<LiteratureReview> {
        let target = fallback_word_count(self.section_word_count, papers.len());

        let prose = cancellable(
            cancel,
            self.synthesizer.synthesize(title, FALLBACK_HEADING, papers, target),
        )
        .await?;
        metrics::record_section("fallback");

        let mut used = UsedPapers::new();
        used.extend(papers);

        Ok(LiteratureReview {
            content: format!("\n## {}\n\n{}\n\n", FALLBACK_HEADING, prose),
            used_papers: used.into_vec(),
            themes: Vec::new(),
            fallback: true,
            failed_themes: Vec::new(),
        })
    }
}

fn fallback_word_count(per_section: u32, papers: usize) -> u32 {
    let papers = u32::try_from(papers).unwrap_or(u32::MAX);
    (per_section.saturating_mul(papers) / 2).max(per_section)
}

/// Resolve each theme's ids against the selected set, keeping theme order
fn resolve_themes<'a>(themes: &'a [Theme], papers: &[SourcePaper]) -> Vec<SectionPlan<'a>> {
    let by_id: HashMap<&str, &SourcePaper> =
        papers.iter().map(|p| (p.external_id.as_str(), p)).collect();

    themes
        .iter()
        .filter_map(|theme| {
            let mut seen = HashSet::new();
            let mut members = Vec::new();
            for id in &theme.paper_ids {
                match by_id.get(id.trim()) {
                    Some(paper) if seen.insert(paper.external_id.as_str()) => {
                        members.push((*paper).clone())
                    }
                    Some(_) => {}
                    None => warn!(theme = %theme.name, paper_id = %id, "Theme references unknown paper, skipping id"),
                }
            }

            if members.is_empty() {
                warn!(theme = %theme.name, "Theme has no resolvable papers, skipping");
                metrics::record_section("skipped");
                None
            } else {
                Some(SectionPlan { theme, papers: members })
            }
        })
        .collect()
}
