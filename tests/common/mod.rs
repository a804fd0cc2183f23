//! Deterministic embedding providers for integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use semantic_memory::EmbeddingProvider;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

/// Gives every distinct text its own axis.
///
/// Identical texts embed identically; different texts are orthogonal, so a
/// subtree scores above zero only if it contains the queried text.
pub struct OneHotEmbedder {
    dim: usize,
    axes: Mutex<HashMap<String, usize>>,
    pub calls: AtomicUsize,
}

impl OneHotEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            axes: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OneHotEmbedder {
    fn model_name(&self) -> &str {
        "one-hot"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut axes = self.axes.lock().unwrap();
        let next = axes.len();
        let axis = *axes.entry(text.to_string()).or_insert(next);
        if axis >= self.dim {
            bail!("out of axes");
        }
        let mut v = vec![0.0; self.dim];
        v[axis] = 1.0;
        Ok(v)
    }
}

/// `[hash(t, i) mod 997 / 997.0 for i in 0..8]`
pub struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-997"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok((0..8u64)
            .map(|seed| {
                let mut hasher = DefaultHasher::new();
                seed.hash(&mut hasher);
                text.hash(&mut hasher);
                (hasher.finish() % 997) as f32 / 997.0 + 0.001
            })
            .collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("request timed out")
    }
}

/// Hash embeddings that wait until the gate is open.
pub struct GatedEmbedder {
    gate: watch::Receiver<bool>,
}

impl GatedEmbedder {
    pub fn new(open: bool) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(open);
        (Self { gate: rx }, tx)
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    fn model_name(&self) -> &str {
        "gated"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open).await?;
        HashEmbedder.embed(text).await
    }
}

/// Text of roughly `len` characters whose windows never repeat.
pub fn numbered_text(len: usize) -> String {
    let mut text = String::new();
    let mut i = 0;
    while text.len() < len {
        text.push_str(&format!("w{} ", i));
        i += 1;
    }
    text.truncate(len);
    text
}
