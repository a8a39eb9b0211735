//! Theme clustering stage
//!
//! Asks the language model to group a paper set into 3-5 named themes and
//! parses the strict JSON answer. Only papers with an abstract are shown to
//! the model; the rest stay in the selected set for later stages.

use crate::errors::{AppError, Result};
use crate::llm::{ChatRequest, LanguageModel};
use crate::sources::SourcePaper;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Metrics and log label for clustering calls
pub const STAGE: &str = "themes";

/// A topical cluster of source papers. Produced once per run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(alias = "Name")]
    pub name: String,

    #[serde(default, alias = "Description")]
    pub description: String,

    #[serde(default, alias = "PaperIDs", alias = "paperIds", alias = "paper_IDs")]
    pub paper_ids: Vec<String>,
}

/// Strip an optional Markdown code fence around the model's JSON
fn strip_code_fence(raw: &str) -> Result<&str> {
    let fence = regex_lite::Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").map_err(|e| {
        AppError::Internal {
            message: format!("Invalid fence pattern: {}", e),
        }
    })?;

    Ok(match fence.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    })
}

/// Parse the clustering response as a JSON array of themes
pub fn parse_themes(raw: &str) -> Result<Vec<Theme>> {
    let body = strip_code_fence(raw)?;
    let themes: Vec<Theme> = serde_json::from_str(body).map_err(|e| AppError::ThemeParse {
        message: e.to_string(),
    })?;

    Ok(themes
        .into_iter()
        .filter(|t| !t.name.trim().is_empty())
        .collect())
}

pub struct ThemeClusterer {
    model: Arc<dyn LanguageModel>,
    max_themes: usize,
}

impl ThemeClusterer {
    pub fn new(model: Arc<dyn LanguageModel>, max_themes: usize) -> Self {
        Self { model, max_themes }
    }

    /// Build the clustering prompt over the papers that carry an abstract
    pub fn build_prompt(title: &str, papers: &[SourcePaper]) -> String {
        let mut prompt = format!(
            "You are a research assistant. Analyze the following academic papers for the thesis titled \"{}\" \
            and identify 3 to 5 key themes or topics that emerge from them.\n\
            For each theme provide:\n\
            1. A concise name for the theme\n\
            2. A 2-3 sentence description of the theme\n\
            3. The IDs of the papers that belong to this theme\n\n\
            Papers:\n",
            title
        );

        for paper in papers {
            if let Some(abstract_text) = paper.abstract_str() {
                prompt.push_str(&format!(
                    "- Paper ID: {}\n  Title: {}\n  Abstract: {}\n\n",
                    paper.external_id, paper.title, abstract_text
                ));
            }
        }

        prompt.push_str(
            "Return ONLY a JSON array of objects, each with the fields \"name\", \"description\" \
            and \"paper_ids\" (an array of paper ID strings). Do not include any other text.",
        );
        prompt
    }

    /// Identify themes. `ThemeParse` means the model answered but not in the
    /// expected schema; callers treat it as "no themes identified".
    pub async fn identify_themes(&self, title: &str, papers: &[SourcePaper]) -> Result<Vec<Theme>> {
        let eligible = papers.iter().filter(|p| p.abstract_str().is_some()).count();
        if eligible == 0 {
            debug!("No papers with abstracts, skipping clustering");
            return Ok(Vec::new());
        }

        let request = ChatRequest::new(STAGE)
            .system("You are a helpful research assistant that outputs strict JSON.")
            .user(Self::build_prompt(title, papers))
            .max_tokens(1500)
            .temperature(0.3);

        let raw = self.model.complete(&request).await?;
        let mut themes = parse_themes(&raw)?;

        if themes.len() > self.max_themes {
            warn!(
                returned = themes.len(),
                max = self.max_themes,
                "Clustering returned too many themes, truncating"
            );
            themes.truncate(self.max_themes);
        }

        debug!(themes = themes.len(), eligible, "Themes identified");
        Ok(themes)
    }
}
