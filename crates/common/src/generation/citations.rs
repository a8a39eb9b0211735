//! Citation reconciler
//!
//! Converts the papers a review actually used into persisted citations.
//! Lookup by (project, DOI), else by (project, external id); existing rows are
//! skipped so re-running generation never duplicates bibliography entries.
//! Per-paper failures are absorbed: reconciliation never fails the caller
//! except on cancellation.

use crate::db::models::NewCitation;
use crate::db::ResearchStore;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::sources::SourcePaper;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Source-system tag stored on every citation created from search results
pub const SOURCE_API: &str = "semantic_scholar";

/// Per-run counts, one entry per paper
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub inserted: usize,
    pub already_present: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl ReconciliationReport {
    pub fn attempted(&self) -> usize {
        self.inserted + self.already_present + self.duplicates + self.failed
    }
}

enum Outcome {
    Inserted,
    AlreadyPresent,
    Duplicate,
}

/// Format an APA-style reference string, omitting absent parts
pub fn format_apa(paper: &SourcePaper) -> String {
    let authors = match paper.authors.len() {
        0 => String::new(),
        1 => paper.authors[0].clone(),
        2 => format!("{} & {}", paper.authors[0], paper.authors[1]),
        n => format!(
            "{}, & {}",
            paper.authors[..n - 1].join(", "),
            paper.authors[n - 1]
        ),
    };
    let year = paper
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "n.d.".to_string());
    let title = paper.title.trim().trim_end_matches('.');

    let mut out = if authors.is_empty() {
        format!("{}. ({}).", title, year)
    } else {
        format!("{} ({}). {}.", authors, year, title)
    };

    if let Some(journal) = paper.journal.as_deref() {
        out.push_str(&format!(" {}.", journal));
    }
    if let Some(doi) = paper.doi_str() {
        out.push_str(&format!(" https://doi.org/{}", doi));
    }
    out
}

fn new_citation(project_id: Uuid, paper: &SourcePaper) -> NewCitation {
    NewCitation {
        project_id,
        title: paper.title.clone(),
        authors: paper.authors.join("; "),
        journal: paper.journal.clone(),
        publication_year: paper.year,
        doi: paper.doi_str().map(str::to_string),
        external_id: paper.external_id_str().map(str::to_string),
        abstract_text: paper.abstract_text.clone(),
        url: paper.open_access_url.clone(),
        source_api: SOURCE_API.to_string(),
        citation_apa: Some(format_apa(paper)),
    }
}

pub struct CitationReconciler {
    store: Arc<dyn ResearchStore>,
}

impl CitationReconciler {
    pub fn new(store: Arc<dyn ResearchStore>) -> Self {
        Self { store }
    }

    /// Reconcile `papers` into `project_id`'s bibliography.
    ///
    /// Each paper is one lookup plus at most one single-row insert, so
    /// stopping between papers leaves nothing half written.
    #[instrument(skip(self, papers, cancel), fields(project_id = %project_id, papers = papers.len()))]
    pub async fn reconcile(
        &self,
        project_id: Uuid,
        papers: &[SourcePaper],
        cancel: &CancellationToken,
    ) -> Result<ReconciliationReport> {
        let mut report = ReconciliationReport::default();

        for paper in papers {
            if cancel.is_cancelled() {
                warn!(processed = report.attempted(), "Reconciliation cancelled between papers");
                return Err(AppError::Cancelled);
            }

            match self.reconcile_one(project_id, paper).await {
                Ok(Outcome::Inserted) => report.inserted += 1,
                Ok(Outcome::AlreadyPresent) => report.already_present += 1,
                Ok(Outcome::Duplicate) => report.duplicates += 1,
                Err(e) => {
                    warn!(paper_id = %paper.external_id, error = %e, "Failed to persist citation, skipping paper");
                    report.failed += 1;
                }
            }
        }

        metrics::record_reconciliation(
            report.inserted,
            report.already_present,
            report.duplicates,
            report.failed,
        );
        info!(
            inserted = report.inserted,
            already_present = report.already_present,
            duplicates = report.duplicates,
            failed = report.failed,
            "Citations reconciled"
        );

        Ok(report)
    }

    async fn reconcile_one(&self, project_id: Uuid, paper: &SourcePaper) -> Result<Outcome> {
        let existing = match (paper.doi_str(), paper.external_id_str()) {
            (Some(doi), _) => self.store.find_citation_by_doi(project_id, doi).await,
            (None, Some(external_id)) => {
                self.store.find_citation_by_external_id(project_id, external_id).await
            }
            (None, None) => Ok(None),
        }
        .map_err(|e| AppError::Reconciliation {
            message: format!("lookup failed: {}", e),
        })?;

        if let Some(citation) = existing {
            debug!(paper_id = %paper.external_id, citation_id = %citation.id, "Citation already present");
            return Ok(Outcome::AlreadyPresent);
        }

        match self.store.insert_citation(new_citation(project_id, paper)).await {
            Ok(citation) => {
                debug!(paper_id = %paper.external_id, citation_id = %citation.id, "Citation inserted");
                Ok(Outcome::Inserted)
            }
            Err(e) if e.is_duplicate() => {
                warn!(paper_id = %paper.external_id, error = %e, "Citation inserted concurrently, treating as present");
                Ok(Outcome::Duplicate)
            }
            Err(e) => Err(AppError::Reconciliation {
                message: format!("insert failed: {}", e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::generation::testing::{paper, papers};
    use std::sync::atomic::Ordering;

    fn setup() -> (Arc<MemoryStore>, CitationReconciler, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let project = store.seed_project("Thesis", None, "Biology");
        let reconciler = CitationReconciler::new(store.clone());
        (store, reconciler, project.id)
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let (store, reconciler, project_id) = setup();
        let mut set = papers(&["a", "b", "c"]);
        set[2].doi = None;
        let cancel = CancellationToken::new();

        let first = reconciler.reconcile(project_id, &set, &cancel).await.unwrap();
        let second = reconciler.reconcile(project_id, &set, &cancel).await.unwrap();

        assert_eq!(first.inserted, 3);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.already_present, 3);
        assert_eq!(store.citations().len(), 3);
    }

    #[tokio::test]
    async fn test_persisted_fields() {
        let (store, reconciler, project_id) = setup();
        reconciler
            .reconcile(project_id, &[paper("a")], &CancellationToken::new())
            .await
            .unwrap();

        let citation = &store.citations()[0];
        assert_eq!(citation.authors, "Author A; Co Author");
        assert_eq!(citation.doi.as_deref(), Some("10.1000/a"));
        assert_eq!(citation.external_id.as_deref(), Some("a"));
        assert_eq!(citation.source_api, SOURCE_API);
        assert!(citation.has_formatted_citation());
    }

    #[tokio::test]
    async fn test_same_paper_in_other_project_is_inserted() {
        let (store, reconciler, project_id) = setup();
        let other = store.seed_project("Other", None, "Biology").id;
        let cancel = CancellationToken::new();
        reconciler.reconcile(project_id, &[paper("a")], &cancel).await.unwrap();
        let report = reconciler.reconcile(other, &[paper("a")], &cancel).await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(store.citations().len(), 2);
    }

    #[tokio::test]
    async fn test_unique_violation_is_treated_as_duplicate() {
        let (store, reconciler, project_id) = setup();
        let cancel = CancellationToken::new();
        reconciler.reconcile(project_id, &[paper("a")], &cancel).await.unwrap();

        store.blind_lookups();
        let report = reconciler.reconcile(project_id, &[paper("a")], &cancel).await.unwrap();
        assert_eq!(report.duplicates, 1);
        assert_eq!(store.citations().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_failure_skips_paper_only() {
        let (store, reconciler, project_id) = setup();
        store.fail_inserts_for("Study b");

        let report = reconciler
            .reconcile(project_id, &papers(&["a", "b", "c"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(store.insert_attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_paper_writes_nothing() {
        let (store, reconciler, project_id) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = reconciler.reconcile(project_id, &papers(&["a"]), &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(store.citations().is_empty());
    }

    #[tokio::test]
    async fn test_blank_identifiers_are_stored_as_absent() {
        let (store, reconciler, project_id) = setup();
        let mut set = papers(&["a", "b"]);
        for p in &mut set {
            p.doi = Some("  ".into());
        }
        set[0].external_id = " a ".into();

        let report = reconciler
            .reconcile(project_id, &set, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.duplicates, 0);
        let citations = store.citations();
        assert!(citations.iter().all(|c| c.doi.is_none()));
        assert_eq!(citations[0].external_id.as_deref(), Some("a"));
        assert!(!citations[0].citation_apa.as_deref().unwrap().contains("doi.org"));
    }

    #[test]
    fn test_format_apa() {
        let mut p = paper("a");
        p.authors = vec!["Smith, J.".into(), "Lee, C.".into(), "Wu, H.".into()];
        assert_eq!(
            format_apa(&p),
            "Smith, J., Lee, C., & Wu, H. (2022). Study a. Journal of Studies. https://doi.org/10.1000/a"
        );

        p.authors.clear();
        p.year = None;
        p.journal = None;
        p.doi = None;
        assert_eq!(format_apa(&p), "Study a. (n.d.).");
    }
}
