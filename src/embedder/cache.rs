//! Memoizing wrapper around any embedder.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use anyhow::Result;
use lru::LruCache;

use super::Embedder;

/// LRU text-to-vector cache in front of another embedder.
///
/// Index builds re-embed the same document chunks on every request, and
/// repeated case queries often reuse identical text; the cache turns both
/// into lookups. Entries are keyed by the exact input string.
pub struct CachedEmbedder<E> {
    inner: E,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl<E: Embedder> CachedEmbedder<E> {
    /// Wraps `inner` with a cache of `capacity` entries.
    pub fn new(inner: E, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut resolved: Vec<Option<Vec<f32>>> = vec![None; inputs.len()];
        let mut misses: Vec<usize> = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap_or_else(|poison| poison.into_inner());
            for (idx, input) in inputs.iter().enumerate() {
                match cache.get(*input) {
                    Some(vector) => resolved[idx] = Some(vector.clone()),
                    None => misses.push(idx),
                }
            }
        }

        if !misses.is_empty() {
            let pending: Vec<&str> = misses.iter().map(|&idx| inputs[idx]).collect();
            let fresh = self.inner.embed_batch(&pending)?;
            anyhow::ensure!(
                fresh.len() == pending.len(),
                "inner embedder returned {} vectors for {} inputs",
                fresh.len(),
                pending.len()
            );
            let mut cache = self.cache.lock().unwrap_or_else(|poison| poison.into_inner());
            for (&idx, vector) in misses.iter().zip(fresh) {
                cache.put(inputs[idx].to_string(), vector.clone());
                resolved[idx] = Some(vector);
            }
        }

        Ok(resolved
            .into_iter()
            .map(|vector| vector.expect("every input resolved"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(inputs.len(), Ordering::SeqCst);
            Ok(inputs.iter().map(|input| vec![input.len() as f32]).collect())
        }
    }

    #[test]
    fn repeated_inputs_hit_the_cache() {
        let inner = CountingEmbedder {
            calls: AtomicUsize::new(0),
        };
        let cached = CachedEmbedder::new(inner, NonZeroUsize::new(8).unwrap());

        let first = cached.embed_batch(&["alpha", "beta"]).expect("embed");
        let second = cached.embed_batch(&["beta", "alpha", "gamma"]).expect("embed");

        assert_eq!(first[1], second[0]);
        assert_eq!(first[0], second[1]);
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn mixed_batches_preserve_input_order() {
        let inner = CountingEmbedder {
            calls: AtomicUsize::new(0),
        };
        let cached = CachedEmbedder::new(inner, NonZeroUsize::new(8).unwrap());
        cached.embed_batch(&["xx"]).expect("embed");

        let vectors = cached.embed_batch(&["a", "xx", "ccc"]).expect("embed");
        assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
    }
}
