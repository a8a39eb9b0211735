//! Source retrieval gateway
//!
//! Queries an external paper search service (Semantic Scholar graph API)
//! and returns candidate [`SourcePaper`] records. One upstream call per
//! search, no automatic retry; retry policy belongs to the caller.

use crate::config::SearchConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use validator::Validate;

const PAPER_FIELDS: &str =
    "paperId,title,authors,year,abstract,externalIds,journal,venue,isOpenAccess,openAccessPdf";

/// A candidate paper returned by the search service. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePaper {
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub year: Option<i32>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub open_access_url: Option<String>,
}

impl SourcePaper {
    /// Abstract text if present and non-blank
    pub fn abstract_str(&self) -> Option<&str> {
        self.abstract_text.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// DOI if present and non-blank
    pub fn doi_str(&self) -> Option<&str> {
        self.doi.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// External identifier if non-blank
    pub fn external_id_str(&self) -> Option<&str> {
        Some(self.external_id.trim()).filter(|s| !s.is_empty())
    }
}

/// Search parameters
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SearchQuery {
    #[validate(length(min = 1, max = 500))]
    pub query: String,

    /// Specialization used to narrow results; appended to the query text
    #[serde(default)]
    #[validate(length(max = 200))]
    pub domain: String,

    /// Papers published before this year are dropped. Defaults to five years back.
    #[serde(default)]
    pub min_year: Option<i32>,

    /// Page size; out-of-range values fall back to the configured default
    #[serde(default)]
    pub limit: Option<u32>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            domain: domain.into(),
            min_year: None,
            limit: None,
        }
    }

    pub fn min_year(mut self, year: i32) -> Self {
        self.min_year = Some(year);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn search_text(&self) -> String {
        let domain = self.domain.trim();
        if domain.is_empty() {
            self.query.trim().to_string()
        } else {
            format!("{} {}", self.query.trim(), domain)
        }
    }
}

/// Trait for paper search backends
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Search for papers; results are filtered locally by `min_year`
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SourcePaper>>;

    /// Fetch one paper by its external identifier
    async fn fetch_paper(&self, external_id: &str) -> Result<SourcePaper>;
}

// Wire types for the graph API

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<WirePaper>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePaper {
    paper_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Vec<WireAuthor>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    external_ids: Option<WireExternalIds>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    journal: Option<WireJournal>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    open_access_pdf: Option<WireOpenAccess>,
}

#[derive(Deserialize)]
struct WireAuthor {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct WireExternalIds {
    #[serde(rename = "DOI", default)]
    doi: Option<String>,
}

#[derive(Deserialize)]
struct WireJournal {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct WireOpenAccess {
    #[serde(default)]
    url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl From<WirePaper> for SourcePaper {
    fn from(paper: WirePaper) -> Self {
        let doi = non_empty(paper.external_ids.and_then(|ids| ids.doi)).or(non_empty(paper.doi));
        let journal = non_empty(paper.journal.and_then(|j| j.name)).or(non_empty(paper.venue));

        SourcePaper {
            external_id: paper.paper_id,
            title: paper.title.unwrap_or_default(),
            authors: paper.authors.into_iter().filter_map(|a| non_empty(a.name)).collect(),
            year: paper.year,
            abstract_text: non_empty(paper.abstract_text),
            doi,
            journal,
            open_access_url: non_empty(paper.open_access_pdf.and_then(|p| p.url)),
        }
    }
}

/// Semantic Scholar graph API client
pub struct SemanticScholarClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_results: u32,
    default_limit: u32,
    default_year_window: i32,
}

impl SemanticScholarClient {
    /// Create a new client from configuration
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            max_results: config.max_results,
            default_limit: config.default_limit,
            default_year_window: config.default_year_window,
        })
    }

    fn effective_limit(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(limit) if limit > 0 && limit <= self.max_results => limit,
            _ => self.default_limit.min(self.max_results),
        }
    }

    fn effective_min_year(&self, requested: Option<i32>) -> i32 {
        match requested {
            Some(year) if year > 0 => year,
            _ => chrono::Utc::now().year() - self.default_year_window,
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(url);
        match self.api_key {
            Some(ref key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    /// Paper detail URL with `external_id` encoded as a single path segment
    fn paper_url(&self, external_id: &str) -> Result<reqwest::Url> {
        let invalid = |message: String| AppError::Configuration { message };
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| invalid(format!("Invalid search API base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("Search API base URL cannot have paths: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["graph", "v1", "paper", external_id]);
        Ok(url)
    }

    async fn fetch_search(&self, query: &SearchQuery, limit: u32) -> Result<Vec<SourcePaper>> {
        let url = format!("{}/graph/v1/paper/search", self.base_url);
        let limit = limit.to_string();

        let response = self
            .request(&url)
            .query(&[
                ("query", query.search_text().as_str()),
                ("fields", PAPER_FIELDS),
                ("limit", limit.as_str()),
                ("offset", "0"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Retrieval {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Retrieval {
                message: format!("Search API returned {}: {}", status.as_u16(), body),
            });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| AppError::Retrieval {
            message: format!("Failed to decode search response: {}", e),
        })?;

        Ok(parsed.data.into_iter().map(SourcePaper::from).collect())
    }
}

#[async_trait]
impl PaperSource for SemanticScholarClient {
    #[instrument(skip(self, query), fields(query = %query.query, domain = %query.domain))]
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SourcePaper>> {
        let limit = self.effective_limit(query.limit);
        let min_year = self.effective_min_year(query.min_year);
        let start = Instant::now();

        let result = self.fetch_search(query, limit).await;
        let elapsed = start.elapsed().as_secs_f64();

        let papers = match result {
            Ok(papers) => papers,
            Err(e) => {
                metrics::record_paper_search(elapsed, 0, false);
                warn!(error = %e, "Paper search failed");
                return Err(e);
            }
        };

        let returned = papers.len();
        let filtered: Vec<SourcePaper> = papers
            .into_iter()
            .filter(|p| p.year.is_some_and(|y| y >= min_year))
            .collect();

        metrics::record_paper_search(elapsed, filtered.len(), true);
        info!(
            returned,
            kept = filtered.len(),
            min_year,
            limit,
            "Paper search completed"
        );

        Ok(filtered)
    }

    #[instrument(skip(self))]
    async fn fetch_paper(&self, external_id: &str) -> Result<SourcePaper> {
        let url = self.paper_url(external_id)?;

        let response = self
            .request(url.as_str())
            .query(&[("fields", PAPER_FIELDS)])
            .send()
            .await
            .map_err(|e| AppError::Retrieval {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Retrieval {
                message: format!("Paper {} lookup returned {}", external_id, status.as_u16()),
            });
        }

        let paper: WirePaper = response.json().await.map_err(|e| AppError::Retrieval {
            message: format!("Failed to decode paper {}: {}", external_id, e),
        })?;

        Ok(paper.into())
    }
}
