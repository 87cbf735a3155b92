//! Semantic document index.
//!
//! Source documents are split into overlapping word windows, each window is
//! embedded into an L2-normalized vector, and the vectors are stored next to
//! their source metadata. Queries are embedded the same way and ranked against
//! every stored vector by cosine similarity.

pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod model;
pub mod progress;
pub mod search;
pub mod store;
pub mod tokenizer;
pub mod vector_ops;

pub use chunker::chunk_text;
pub use config::Settings;
pub use embedder::Embedder;
pub use error::{ErrorKind, Result, SemdexError};
pub use extract::{PlainTextExtractor, TextExtractor};
pub use indexer::{build_index_ok, BuildReport, ChunkOptions, FileOutcome, IndexBuilder, SkipReason};
pub use model::{ModelLoader, OnnxModelLoader, ScoringModel};
pub use progress::{ChannelProgress, NoProgress, ProgressSink};
pub use search::{search, SearchEngine, SearchResult};
pub use store::{
    index_exists, index_info, load_index, load_vectors, save_index, save_vectors, IndexEntry, IndexInfo,
};
pub use tokenizer::{HashTokenizer, TokenizerScheme};
pub use vector_ops::{cosine_similarity, find_top_k};
