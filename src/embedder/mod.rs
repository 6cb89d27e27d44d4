//! Text-embedding capability consumed by the retriever.

use std::sync::Arc;

use anyhow::Result;

pub mod cache;
pub mod openai;

pub use cache::CachedEmbedder;
pub use openai::OpenAiEmbedder;

/// Maps text to fixed-length vectors via an external embedding service.
///
/// The capability is injected into the retriever rather than reached through
/// ambient global state, so deterministic stubs can stand in during tests.
/// Individual calls may fail transiently; the retriever decides whether a
/// failure is skippable (chunk embedding during an index build) or fatal
/// (query embedding).
pub trait Embedder: Send + Sync {
    /// Embeds a batch of inputs, returning one vector per input in input order.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single input.
    fn embed(&self, input: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[input])?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding service returned no vector"))
    }
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(inputs)
    }

    fn embed(&self, input: &str) -> Result<Vec<f32>> {
        (**self).embed(input)
    }
}

impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(inputs)
    }

    fn embed(&self, input: &str) -> Result<Vec<f32>> {
        (**self).embed(input)
    }
}
