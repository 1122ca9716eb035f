use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::types::{ContentHash, Document};
use crate::error::{RagError, Result};
use crate::llm::Embedder;

// No trailing slash on substore prefixes
const EMBED_PREFIX: &str = "embed";

/// Texts sent per embedding request.
const EMBED_BATCH: usize = 64;

fn embed_key(model: &str, hash: &str) -> String {
    format!("{}/{}/{}", EMBED_PREFIX, model, hash)
}

/// On-disk cache of document embeddings, keyed by model and content hash.
pub struct EmbeddingCache {
    storage: Storage,
}

impl EmbeddingCache {
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let storage = Storage::load(dir.to_path_buf(), vec![EMBED_PREFIX.to_string()])
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self { storage })
    }

    pub async fn get(&self, model: &str, hash: &str) -> Result<Option<Vec<f32>>> {
        let snapshot = self.storage.latest_snapshot();
        let Some(bytes) = snapshot.get_raw(&embed_key(model, hash)).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(vector) => Ok(Some(vector)),
            Err(e) => {
                warn!(hash, "Discarding unreadable cached embedding: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn put_many(&self, model: &str, entries: &[(ContentHash, Vec<f32>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        for (hash, vector) in entries {
            delta.put_raw(embed_key(model, hash), serde_json::to_vec(vector)?);
        }
        self.storage.commit(delta).await?;
        debug!(model, count = entries.len(), "embeddings cached");
        Ok(())
    }

    /// Number of vectors cached for `model`.
    pub async fn count(&self, model: &str) -> usize {
        let snapshot = self.storage.latest_snapshot();
        let prefix = format!("{}/{}/", EMBED_PREFIX, model);
        let mut stream = snapshot.prefix_raw(&prefix);
        let mut count = 0;
        while let Some(entry) = stream.next().await {
            match entry {
                Ok(_) => count += 1,
                Err(e) => warn!("Error reading embedding cache: {}", e),
            }
        }
        count
    }
}

/// Compute one vector per document, reusing cached vectors and embedding only
/// content the cache has not seen. Identical contents share one vector.
pub async fn build_vectors(
    documents: &[Document],
    embedder: &dyn Embedder,
    cache: &EmbeddingCache,
) -> Result<Vec<Vec<f32>>> {
    let model = embedder.model_name().to_string();
    let hashes: Vec<ContentHash> = documents.iter().map(Document::content_hash).collect();

    let mut known: HashMap<ContentHash, Vec<f32>> = HashMap::new();
    let mut missing: Vec<(ContentHash, String)> = Vec::new();
    let mut seen = HashSet::new();
    for (doc, hash) in documents.iter().zip(&hashes) {
        if !seen.insert(hash.as_str()) {
            continue;
        }
        match cache.get(&model, hash).await? {
            Some(vector) => {
                known.insert(hash.clone(), vector);
            }
            None => missing.push((hash.clone(), doc.content.clone())),
        }
    }

    info!(
        model = %model,
        cached = known.len(),
        to_embed = missing.len(),
        "Building corpus vectors"
    );

    for batch in missing.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(RagError::Corpus(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }
        let entries: Vec<(ContentHash, Vec<f32>)> = batch
            .iter()
            .map(|(hash, _)| hash.clone())
            .zip(vectors)
            .collect();
        cache.put_many(&model, &entries).await?;
        known.extend(entries);
        debug!(embedded = known.len(), "embedding batch committed");
    }

    hashes
        .iter()
        .map(|hash| {
            known.get(hash).cloned().ok_or_else(|| {
                RagError::Corpus(format!("no embedding produced for {}", hash))
            })
        })
        .collect()
}
