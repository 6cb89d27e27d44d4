#![warn(missing_docs)]
//! Retrieval-grounded analysis of case studies against an uploaded ISO
//! standard, plus structured evaluation extraction from model output.
//!
//! The pipeline: extracted page texts are chunked, embedded through an
//! injected [`Embedder`], and indexed for nearest-neighbor search; the best
//! matching chunks ground a generation prompt; free-form model replies are
//! parsed into a fixed-schema [`EvaluationRecord`] with a documented default
//! when parsing fails. Session state (one document text, one analysis text
//! per session id) lives behind the [`SessionStore`] contract.

pub mod chunker;
pub mod document;
pub mod embedder;
pub mod extract;
pub mod generator;
pub mod index;
pub mod prompt;
pub mod retriever;
pub mod session;

pub use chunker::{chunk_pages, Chunk, ChunkerConfig};
pub use document::{Document, DocumentReceipt, PdfTextSource, TextSource};
pub use embedder::{CachedEmbedder, Embedder, OpenAiEmbedder};
pub use extract::{extract_evaluation, EvaluationRecord};
pub use generator::{GeminiGenerator, GenerationRequest, OpenAiGenerator, TextGenerator};
pub use index::{FlatIndex, IndexError, SearchHit, VectorIndex};
pub use retriever::{DocumentIndex, RetrievalError, Retriever, RetrieverConfig};
pub use session::{
    sanitize_session_id, FileSessionStore, MemorySessionStore, SessionError, SessionStore, Slot,
    DEFAULT_SESSION,
};
