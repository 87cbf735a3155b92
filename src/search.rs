//! Query side of the index.

use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Number;
use crate::embedder::Embedder;
use crate::error::{Result, SemdexError};
use crate::store::{index_exists, load_index_file, load_vectors, IndexEntry};
use crate::vector_ops::{find_top_k, find_top_k_par};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub file: String,
    pub path: String,
    pub chunk: String,
    pub score: Number,
}

#[derive(Debug, Default)]
pub struct SearchTimings {
    pub load_duration: Duration,
    pub embed_duration: Duration,
    pub rank_duration: Duration,
    pub total_duration: Duration,
}

/// Answers similarity queries against a persisted index.
///
/// Both artifacts are read from disk on every query.
pub struct SearchEngine<'a> {
    embedder: &'a Embedder,
    parallel_scan: bool,
}

impl<'a> SearchEngine<'a> {
    pub fn new(embedder: &'a Embedder) -> Self {
        Self {
            embedder,
            parallel_scan: false,
        }
    }

    /// Score candidates on the rayon pool. Results are identical either way.
    pub fn with_parallel_scan(mut self, parallel_scan: bool) -> Self {
        self.parallel_scan = parallel_scan;
        self
    }

    pub fn search(&self, query: &str, index_dir: impl AsRef<Path>, top_k: usize) -> Result<Vec<SearchResult>> {
        self.search_timed(query, index_dir, top_k).map(|(results, _)| results)
    }

    pub fn search_timed(
        &self,
        query: &str,
        index_dir: impl AsRef<Path>,
        top_k: usize,
    ) -> Result<(Vec<SearchResult>, SearchTimings)> {
        let index_dir = index_dir.as_ref();
        let start = Instant::now();
        let mut timings = SearchTimings::default();

        if top_k == 0 {
            return Err(SemdexError::InvalidArgument(
                "top_k must be greater than 0".to_string(),
            ));
        }
        if !index_exists(index_dir) {
            return Err(SemdexError::NotFound(index_dir.to_path_buf()));
        }

        let load_start = Instant::now();
        let index = load_index_file(index_dir)?;
        let vectors = load_vectors(index_dir)?;
        timings.load_duration = load_start.elapsed();

        if index.entries.is_empty() || vectors.is_empty() {
            debug!(index = %index_dir.display(), "index is empty");
            timings.total_duration = start.elapsed();
            return Ok((Vec::new(), timings));
        }
        if index.entries.len() != vectors.len() {
            warn!(
                entries = index.entries.len(),
                vectors = vectors.len(),
                "entry and vector counts differ; rebuild the index"
            );
        }
        if let Some(built_with) = index.tokenizer {
            if built_with != self.embedder.scheme() {
                warn!(
                    built_with = %built_with,
                    querying_with = %self.embedder.scheme(),
                    "index was built with a different tokenizer scheme"
                );
            }
        }

        let embed_start = Instant::now();
        let query_vector = self.embedder.embed(query)?;
        timings.embed_duration = embed_start.elapsed();

        let rank_start = Instant::now();
        let ranked = if self.parallel_scan {
            find_top_k_par(&query_vector, &vectors, top_k)?
        } else {
            find_top_k(&query_vector, &vectors, top_k)?
        };
        timings.rank_duration = rank_start.elapsed();

        let results = to_results(ranked, &index.entries);
        timings.total_duration = start.elapsed();
        info!(
            candidates = vectors.len(),
            results = results.len(),
            elapsed = ?timings.total_duration,
            "search complete"
        );
        Ok((results, timings))
    }
}

/// Maps ranked vector positions back to entries, dropping positions that
/// have no entry.
fn to_results(ranked: Vec<(usize, Number)>, entries: &[IndexEntry]) -> Vec<SearchResult> {
    ranked
        .into_iter()
        .filter_map(|(i, score)| {
            entries.get(i).map(|entry| SearchResult {
                file: entry.file.clone(),
                path: entry.path.clone(),
                chunk: entry.chunk.clone(),
                score,
            })
        })
        .collect()
}

pub fn search(
    embedder: &Embedder,
    query: &str,
    index_dir: impl AsRef<Path>,
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    SearchEngine::new(embedder).search(query, index_dir, top_k)
}
