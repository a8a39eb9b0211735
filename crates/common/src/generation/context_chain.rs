//! Chapter context chain
//!
//! Supplies upstream chapter context to dependent chapter generation. Pure
//! data: nothing here calls the language model.

use crate::db::models::{ChapterType, Project};
use crate::db::ResearchStore;
use crate::errors::Result;
use crate::generation::review::FALLBACK_HEADING;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Stands in for the literature review when none has been written yet
pub const LITERATURE_REVIEW_PLACEHOLDER: &str =
    "Literature review is pending or not yet summarized.";

const ELLIPSIS: &str = "...";

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '?' | '!')
}

/// Shorten `content` to about `budget` characters, preferring a sentence end.
///
/// Content within budget is returned unchanged. Otherwise the cut lands on the
/// last terminator inside the budget, or failing that the first one before
/// twice the budget. With neither, the content is cut at the budget. An
/// ellipsis is appended to every shortened result, so the output never
/// exceeds `2 * budget` characters plus the ellipsis.
pub fn truncate_at_sentence(content: &str, budget: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= budget {
        return content.to_string();
    }

    let backward = (0..budget).rev().find(|&i| is_terminator(chars[i]));
    let limit = budget.saturating_mul(2).min(chars.len());
    let end = backward
        .or_else(|| (budget..limit).find(|&i| is_terminator(chars[i])))
        .map_or(budget, |i| i + 1);

    let mut out: String = chars[..end].iter().collect();
    out.push_str(ELLIPSIS);
    out
}

/// Theme names recovered from a literature review's `## ` headings
pub fn extract_theme_headings(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("## "))
        .map(str::trim)
        .filter(|h| !h.is_empty() && *h != FALLBACK_HEADING)
        .map(str::to_string)
        .collect()
}

/// Context handed to introduction generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroductionContext {
    pub literature_summary: String,
    pub key_themes: Vec<String>,
}

impl IntroductionContext {
    fn placeholder() -> Self {
        Self {
            literature_summary: LITERATURE_REVIEW_PLACEHOLDER.to_string(),
            key_themes: Vec::new(),
        }
    }
}

/// Coarse research approach inferred from the project description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchType {
    Qualitative,
    Quantitative,
    MixedMethods,
    General,
}

impl ResearchType {
    pub fn label(&self) -> &'static str {
        match self {
            ResearchType::Qualitative => "Qualitative Research",
            ResearchType::Quantitative => "Quantitative Research",
            ResearchType::MixedMethods => "Mixed-Methods Research",
            ResearchType::General => "general academic research",
        }
    }
}

/// Case-insensitive substring classification of a project description
pub fn classify_research_type(description: Option<&str>) -> ResearchType {
    let Some(description) = description else {
        return ResearchType::General;
    };
    let lower = description.to_lowercase();

    match (lower.contains("qualitative"), lower.contains("quantitative")) {
        (true, true) => ResearchType::MixedMethods,
        (true, false) => ResearchType::Qualitative,
        (false, true) => ResearchType::Quantitative,
        (false, false) => ResearchType::General,
    }
}

pub struct ContextChain {
    store: Arc<dyn ResearchStore>,
    budget: usize,
}

impl ContextChain {
    pub fn new(store: Arc<dyn ResearchStore>, budget: usize) -> Self {
        Self { store, budget }
    }

    /// Literature review summary and themes for the introduction
    pub async fn introduction_context(&self, project_id: Uuid) -> Result<IntroductionContext> {
        let chapter = self
            .store
            .find_chapter_by_type(project_id, ChapterType::LiteratureReview)
            .await?;

        let Some(chapter) = chapter.filter(|c| !c.content.trim().is_empty()) else {
            warn!(project_id = %project_id, "No literature review content, using placeholder context");
            return Ok(IntroductionContext::placeholder());
        };

        let literature_summary = truncate_at_sentence(chapter.content.trim(), self.budget);
        let key_themes = extract_theme_headings(&chapter.content);
        debug!(
            project_id = %project_id,
            summary_chars = literature_summary.chars().count(),
            themes = key_themes.len(),
            "Introduction context prepared"
        );

        Ok(IntroductionContext {
            literature_summary,
            key_themes,
        })
    }

    /// Research type for the methodology template
    pub fn methodology_context(project: &Project) -> ResearchType {
        classify_research_type(project.description.as_deref())
    }
}
