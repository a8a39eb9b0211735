//! Section synthesis stage: prose for one theme from its member papers.
//! The model's output is accepted as-is; citations are not validated locally.

use crate::errors::{AppError, Result};
use crate::llm::{ChatRequest, LanguageModel};
use crate::sources::SourcePaper;
use std::sync::Arc;

pub const STAGE: &str = "section";

pub struct SectionSynthesizer {
    model: Arc<dyn LanguageModel>,
}

impl SectionSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn build_prompt(title: &str, theme: &str, papers: &[SourcePaper], target_words: u32) -> String {
        let mut prompt = format!(
            "You are writing a section of a literature review for a thesis titled \"{}\".\n\
            Write a section of approximately {} words discussing the theme \"{}\".\n\
            Discuss how the following papers relate to this theme, comparing and contrasting \
            their findings where relevant.\n\n\
            Papers:\n",
            title, target_words, theme
        );

        for paper in papers {
            prompt.push_str(&format!(
                "- Title: {}\n  Authors: {}\n  Year: {}\n  Abstract: {}\n\n",
                paper.title,
                if paper.authors.is_empty() {
                    "Unknown".to_string()
                } else {
                    paper.authors.join(", ")
                },
                paper.year.map(|y| y.to_string()).unwrap_or_else(|| "n.d.".into()),
                paper.abstract_str().unwrap_or("No abstract available."),
            ));
        }

        prompt.push_str(
            "Write in a formal academic style. Cite papers inline in author-year form, \
            for example (Smith, 2021) or (Smith et al., 2021). Return only the section prose.",
        );
        prompt
    }

    /// Synthesize prose for `theme`. Any failure is reported as `AppError::Section`.
    pub async fn synthesize(
        &self,
        title: &str,
        theme: &str,
        papers: &[SourcePaper],
        target_words: u32,
    ) -> Result<String> {
        let request = ChatRequest::new(STAGE)
            .system("You are a skilled academic writer.")
            .user(Self::build_prompt(title, theme, papers, target_words))
            .max_tokens(target_words.saturating_mul(2).max(500))
            .temperature(0.7);

        match self.model.complete(&request).await {
            Ok(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Ok(_) => Err(AppError::Section {
                theme: theme.to_string(),
                message: "empty completion".to_string(),
            }),
            Err(AppError::Cancelled) => Err(AppError::Cancelled),
            Err(e) => Err(AppError::Section {
                theme: theme.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::testing::{papers, ScriptedModel};

    #[test]
    fn test_prompt_carries_word_target_and_abstracts() {
        let prompt = SectionSynthesizer::build_prompt("T", "Methods", &papers(&["a"]), 750);
        assert!(prompt.contains("approximately 750 words"));
        assert!(prompt.contains("Findings of study a."));
        assert!(prompt.contains("Author A, Co Author"));
    }

    #[tokio::test]
    async fn test_model_failure_becomes_section_error() {
        let model = Arc::new(ScriptedModel::new(|_| {
            Err(AppError::LanguageModel { message: "API error 500".into() })
        }));
        let err = SectionSynthesizer::new(model)
            .synthesize("T", "Methods", &papers(&["a"]), 500)
            .await
            .unwrap_err();
        match err {
            AppError::Section { theme, message } => {
                assert_eq!(theme, "Methods");
                assert!(message.contains("500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_blank_completion_is_rejected() {
        let model = Arc::new(ScriptedModel::new(|_| Ok("  \n".into())));
        let result = SectionSynthesizer::new(model)
            .synthesize("T", "Methods", &papers(&["a"]), 500)
            .await;
        assert!(matches!(result, Err(AppError::Section { .. })));
    }
}
