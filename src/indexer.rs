//! Index builds over a directory tree.
//!
//! Every file is extracted, chunked and embedded in enumeration order. Per-file
//! failures become [`SkipReason`]s in the [`BuildReport`]; the store is written
//! once at the end.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunker::chunk_text;
use crate::config::Number;
use crate::embedder::Embedder;
use crate::error::{Result, SemdexError};
use crate::extract::TextExtractor;
use crate::progress::{fraction, ProgressSink};
use crate::store::{save_index_tagged, save_vectors, IndexEntry};

#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub chunk_size: usize,
    pub overlap: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Extraction produced no usable text.
    Empty,
    ExtractionFailed(String),
    EmbeddingFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Empty => f.write_str("no extractable text"),
            SkipReason::ExtractionFailed(e) => write!(f, "extraction failed: {e}"),
            SkipReason::EmbeddingFailed(e) => write!(f, "embedding failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Number of chunks embedded for the file.
    Indexed(usize),
    Skipped(SkipReason),
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub files_total: usize,
    pub files_indexed: usize,
    pub files_skipped: Vec<(PathBuf, SkipReason)>,
    pub chunks_embedded: usize,
}

impl BuildReport {
    /// A build succeeds when at least one vector was embedded.
    pub fn success(&self) -> bool {
        self.chunks_embedded > 0
    }
}

/// Drives a full index build over a directory tree.
pub struct IndexBuilder<'a> {
    embedder: &'a Embedder,
    extractor: &'a dyn TextExtractor,
    options: ChunkOptions,
}

/// Vectors and entries of the build in progress, in ordinal order.
#[derive(Default)]
struct Accumulator {
    vectors: Vec<Vec<Number>>,
    entries: Vec<IndexEntry>,
}

impl Accumulator {
    fn push(&mut self, file: &str, path: &str, chunk: String, vector: Vec<Number>) {
        self.entries.push(IndexEntry {
            file: file.to_string(),
            path: path.to_string(),
            chunk,
            index: self.vectors.len(),
        });
        self.vectors.push(vector);
    }
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a Embedder, extractor: &'a dyn TextExtractor, options: ChunkOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(SemdexError::InvalidArgument(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            embedder,
            extractor,
            options,
        })
    }

    /// Indexes every file under `source_dir` and writes the store to `output_dir`.
    ///
    /// Files that cannot be extracted or embedded are skipped and listed in the
    /// report. The store is written once, after all files, and only if at least
    /// one vector was produced. A model load failure or a failed write is
    /// returned as an error.
    pub fn build(
        &self,
        source_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        progress: &dyn ProgressSink,
    ) -> Result<BuildReport> {
        let source_dir = source_dir.as_ref();
        let output_dir = output_dir.as_ref();
        let start = Instant::now();

        let files = enumerate_files(source_dir)?;
        info!(files = files.len(), source = %source_dir.display(), "building index");

        let mut report = BuildReport {
            files_total: files.len(),
            ..BuildReport::default()
        };
        let mut acc = Accumulator::default();

        for (done, path) in files.iter().enumerate() {
            match self.index_file(path, &mut acc)? {
                FileOutcome::Indexed(chunks) => {
                    debug!(path = %path.display(), chunks, "indexed file");
                    report.files_indexed += 1;
                    report.chunks_embedded += chunks;
                }
                FileOutcome::Skipped(reason) => {
                    match &reason {
                        SkipReason::Empty => debug!(path = %path.display(), "skipping empty file"),
                        other => warn!(path = %path.display(), reason = %other, "skipping file"),
                    }
                    report.files_skipped.push((path.clone(), reason));
                }
            }
            progress.report(fraction(done + 1, files.len()));
        }

        if !report.success() {
            warn!(
                files = report.files_total,
                skipped = report.files_skipped.len(),
                "no vectors produced, index not written"
            );
            return Ok(report);
        }

        save_vectors(&acc.vectors, output_dir)?;
        save_index_tagged(&acc.entries, self.embedder.scheme(), output_dir)?;

        info!(
            indexed = report.files_indexed,
            skipped = report.files_skipped.len(),
            chunks = report.chunks_embedded,
            output = %output_dir.display(),
            elapsed = ?start.elapsed(),
            "index written"
        );
        Ok(report)
    }

    /// Extracts, chunks and embeds one file.
    ///
    /// The file's chunks are appended only once all of them embedded, so a
    /// skipped file leaves no partial entries and ordinals stay contiguous.
    /// A model that fails to load aborts the build instead of skipping.
    fn index_file(&self, path: &Path, acc: &mut Accumulator) -> Result<FileOutcome> {
        let text = match self.extractor.extract_text(path) {
            Ok(text) => text,
            Err(e) => return Ok(FileOutcome::Skipped(SkipReason::ExtractionFailed(e.to_string()))),
        };
        if text.trim().is_empty() {
            return Ok(FileOutcome::Skipped(SkipReason::Empty));
        }

        let chunks: Vec<String> = chunk_text(&text, self.options.chunk_size, self.options.overlap)
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .collect();
        if chunks.is_empty() {
            return Ok(FileOutcome::Skipped(SkipReason::Empty));
        }

        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match self.embedder.embed(&chunk) {
                Ok(vector) => embedded.push((chunk, vector)),
                Err(e @ SemdexError::ModelLoad(_)) => return Err(e),
                Err(e) => {
                    return Ok(FileOutcome::Skipped(SkipReason::EmbeddingFailed(e.to_string())))
                }
            }
        }

        let count = embedded.len();
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let path = path.display().to_string();
        for (chunk, vector) in embedded {
            acc.push(&file, &path, chunk, vector);
        }
        Ok(FileOutcome::Indexed(count))
    }
}

/// Every regular file below `dir`, in sorted path order.
pub fn enumerate_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SemdexError::NotFound(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "skipping unreadable directory entry"),
        }
    }
    Ok(files)
}

/// Builds the index and reports only whether it succeeded.
pub fn build_index_ok(
    embedder: &Embedder,
    extractor: &dyn TextExtractor,
    source_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    options: ChunkOptions,
    progress: &dyn ProgressSink,
) -> bool {
    let result = IndexBuilder::new(embedder, extractor, options)
        .and_then(|builder| builder.build(source_dir, output_dir, progress));
    match result {
        Ok(report) => report.success(),
        Err(e) => {
            warn!(error = %e, "index build failed");
            false
        }
    }
}
