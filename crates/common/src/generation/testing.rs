//! Scripted fakes shared by the pipeline tests

use crate::errors::{AppError, Result};
use crate::llm::{ChatRequest, LanguageModel};
use crate::sources::{PaperSource, SearchQuery, SourcePaper};
use async_trait::async_trait;
use std::sync::Mutex;

type Responder = Box<dyn Fn(&ChatRequest) -> Result<String> + Send + Sync>;

/// Language model that answers from a closure and records every request
pub struct ScriptedModel {
    responder: Responder,
    pub calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(responder: impl Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_for(&self, stage: &str) -> Vec<ChatRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stage == stage)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.calls.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Clustering output for `(name, paper ids)` pairs
pub fn themes_json(themes: &[(&str, &[&str])]) -> String {
    let items: Vec<serde_json::Value> = themes
        .iter()
        .map(|(name, ids)| {
            serde_json::json!({
                "name": name,
                "description": format!("Work on {}.", name),
                "paper_ids": ids,
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

pub fn paper(id: &str) -> SourcePaper {
    SourcePaper {
        external_id: id.to_string(),
        title: format!("Study {}", id),
        authors: vec![format!("Author {}", id.to_uppercase()), "Co Author".to_string()],
        year: Some(2022),
        abstract_text: Some(format!("Findings of study {}.", id)),
        doi: Some(format!("10.1000/{}", id)),
        journal: Some("Journal of Studies".to_string()),
        open_access_url: None,
    }
}

pub fn papers(ids: &[&str]) -> Vec<SourcePaper> {
    ids.iter().map(|id| paper(id)).collect()
}

/// Paper source backed by a fixed list
pub struct StaticSource {
    pub papers: Vec<SourcePaper>,
}

#[async_trait]
impl PaperSource for StaticSource {
    async fn search(&self, _query: &SearchQuery) -> Result<Vec<SourcePaper>> {
        Ok(self.papers.clone())
    }

    async fn fetch_paper(&self, external_id: &str) -> Result<SourcePaper> {
        self.papers
            .iter()
            .find(|p| p.external_id == external_id)
            .cloned()
            .ok_or_else(|| AppError::Retrieval {
                message: format!("Paper {} lookup returned 404", external_id),
            })
    }
}
