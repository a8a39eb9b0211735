//! Content generation pipeline
//!
//! Stages, leaves first:
//! - `themes`: cluster selected papers into named themes
//! - `synthesis`: write prose for one theme
//! - `review`: clustering, per-theme synthesis and aggregation
//! - `citations`: dedupe and persist the papers a review actually used
//! - `context_chain`: upstream chapter context for dependent chapters
//! - `chapters`: chapter-type dispatch and the chapter save step
//! - `assembly`: renderer handoff with document status tracking

pub mod assembly;
pub mod chapters;
pub mod citations;
pub mod context_chain;
pub mod review;
pub mod synthesis;
pub mod themes;

use crate::errors::{AppError, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Race `fut` against `cancel`. A cancelled token wins even if the future is ready.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = fut => result,
    }
}

/// Count whitespace separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
pub(crate) mod testing;
