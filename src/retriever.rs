//! Chunk, embed, and index a document; answer nearest-chunk queries.

use std::collections::BTreeMap;
use std::thread;

use crossbeam_channel::{bounded, unbounded};
use thiserror::Error;
use tracing::{debug, warn};

use crate::chunker::{chunk_pages, Chunk, ChunkerConfig};
use crate::document::Document;
use crate::embedder::Embedder;
use crate::index::{FlatIndex, IndexError, VectorIndex};

/// Errors surfaced while indexing a document or answering a query.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Extraction and chunking produced nothing to index.
    #[error("document produced no usable text content")]
    NoUsableContent,
    /// Every chunk embedding call failed, so the index would be empty.
    #[error("all {failed} chunk embedding calls failed")]
    NoEmbeddableContent {
        /// Number of chunks whose embedding calls failed.
        failed: usize,
    },
    /// A query-time embedding call failed; fatal for that query.
    #[error("embedding service call failed")]
    EmbeddingService(#[source] anyhow::Error),
    /// Index construction or search failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Retriever tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct RetrieverConfig {
    /// Chunking parameters.
    pub chunker: ChunkerConfig,
    /// Inputs per embedding request during index builds.
    pub batch_size: usize,
    /// Concurrent embedding workers during index builds.
    pub worker_threads: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            batch_size: 16,
            worker_threads: 2,
        }
    }
}

/// Per-request retrieval state built for one document.
#[derive(Debug)]
pub struct DocumentIndex {
    chunks: Vec<Chunk>,
    index: FlatIndex,
    skipped_chunks: usize,
}

impl DocumentIndex {
    /// Chunks produced from the document, in document order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Looks up a chunk by the id stored in the index.
    pub fn chunk(&self, chunk_id: usize) -> Option<&Chunk> {
        self.chunks.iter().find(|chunk| chunk.chunk_id == chunk_id)
    }

    /// Number of chunks dropped because their embedding calls failed.
    pub fn skipped_chunks(&self) -> usize {
        self.skipped_chunks
    }

    /// Number of embedded chunks available to search.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when no chunks were embedded.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Dimensionality of the stored embeddings.
    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }
}

/// Orchestrates chunking, embedding, and index construction for a document,
/// then answers nearest-chunk queries against the result.
pub struct Retriever<E> {
    embedder: E,
    config: RetrieverConfig,
}

impl<E: Embedder> Retriever<E> {
    /// Builds a retriever around an injected embedding capability.
    pub fn new(embedder: E, config: RetrieverConfig) -> Self {
        Self { embedder, config }
    }

    /// Chunks and embeds `document`, building a searchable index.
    ///
    /// Chunk batches whose embedding call fails are skipped and counted, not
    /// fatal, as long as at least one chunk embeds; zero embedded chunks fail
    /// with [`RetrievalError::NoEmbeddableContent`]. A document with no usable
    /// text fails with [`RetrievalError::NoUsableContent`] before any service
    /// call is made.
    pub fn index_document(&self, document: &Document) -> Result<DocumentIndex, RetrievalError> {
        let chunks = chunk_pages(document.pages(), &self.config.chunker);
        if chunks.is_empty() {
            return Err(RetrievalError::NoUsableContent);
        }

        let batch_size = self.config.batch_size.max(1);
        let batches: Vec<&[Chunk]> = chunks.chunks(batch_size).collect();
        let outcomes = self.embed_batches(&batches);

        let mut entries: Vec<(usize, Vec<f32>)> = Vec::with_capacity(chunks.len());
        let mut skipped = 0usize;
        for (batch, outcome) in batches.iter().zip(outcomes) {
            match outcome {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for (chunk, vector) in batch.iter().zip(vectors) {
                        entries.push((chunk.chunk_id, vector));
                    }
                }
                Ok(vectors) => {
                    skipped += batch.len();
                    warn!(
                        expected = batch.len(),
                        actual = vectors.len(),
                        "embedding batch returned a wrong vector count; skipping"
                    );
                }
                Err(err) => {
                    skipped += batch.len();
                    warn!(
                        chunks = batch.len(),
                        error = %err,
                        "skipping batch after embedding failure"
                    );
                }
            }
        }

        if entries.is_empty() {
            return Err(RetrievalError::NoEmbeddableContent { failed: skipped });
        }
        let index = FlatIndex::build(entries)?;
        debug!(
            embedded = index.len(),
            skipped,
            dimensions = index.dimensions(),
            "document index built"
        );
        Ok(DocumentIndex {
            chunks,
            index,
            skipped_chunks: skipped,
        })
    }

    /// Embeds `query` and returns the single closest chunk.
    pub fn query_best<'i>(
        &self,
        document_index: &'i DocumentIndex,
        query: &str,
    ) -> Result<&'i Chunk, RetrievalError> {
        let mut hits = self.query_top_k(document_index, query, 1)?;
        match hits.pop() {
            Some((chunk, _)) => Ok(chunk),
            None => Err(RetrievalError::Index(IndexError::EmptyIndex)),
        }
    }

    /// Embeds `query` and returns up to `k` chunks ordered by ascending
    /// squared Euclidean distance.
    pub fn query_top_k<'i>(
        &self,
        document_index: &'i DocumentIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<(&'i Chunk, f32)>, RetrievalError> {
        let vector = self
            .embedder
            .embed(query)
            .map_err(RetrievalError::EmbeddingService)?;
        let hits = document_index.index.search(&vector, k)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                document_index
                    .chunk(hit.chunk_id)
                    .map(|chunk| (chunk, hit.distance))
            })
            .collect())
    }

    /// Runs one embedding call per batch, fanning out across a bounded worker
    /// pool and reassembling outcomes in submission order.
    fn embed_batches(&self, batches: &[&[Chunk]]) -> Vec<anyhow::Result<Vec<Vec<f32>>>> {
        let workers = self.config.worker_threads.max(1).min(batches.len());
        if workers <= 1 {
            return batches.iter().map(|batch| self.embed_one(batch)).collect();
        }

        let (task_tx, task_rx) = bounded::<(usize, &[Chunk])>(workers * 2);
        // Results are unbounded so workers never block behind the dispatcher.
        let (result_tx, result_rx) = unbounded::<(usize, anyhow::Result<Vec<Vec<f32>>>)>();
        let mut ordered: BTreeMap<usize, anyhow::Result<Vec<Vec<f32>>>> = BTreeMap::new();

        thread::scope(|scope| {
            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let embedder = &self.embedder;
                scope.spawn(move || {
                    while let Ok((batch_id, batch)) = task_rx.recv() {
                        let texts: Vec<&str> =
                            batch.iter().map(|chunk| chunk.text.as_str()).collect();
                        let outcome = embedder.embed_batch(&texts);
                        if result_tx.send((batch_id, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            for (batch_id, batch) in batches.iter().enumerate() {
                if task_tx.send((batch_id, *batch)).is_err() {
                    break;
                }
            }
            drop(task_tx);

            for (batch_id, outcome) in result_rx.iter() {
                ordered.insert(batch_id, outcome);
            }
        });

        ordered.into_values().collect()
    }

    fn embed_one(&self, batch: &[Chunk]) -> anyhow::Result<Vec<Vec<f32>>> {
        let texts: Vec<&str> = batch.iter().map(|chunk| chunk.text.as_str()).collect();
        self.embedder.embed_batch(&texts)
    }
}
