pub mod index;
pub mod types;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::info;

use crate::error::{RagError, Result};
use crate::llm::Embedder;
use index::EmbeddingCache;
use types::Document;

/// Read-only document store shared by all requests.
///
/// Documents and their embedding vectors are aligned by position. The store
/// answers two kinds of query: a metadata filter by project and a
/// nearest-neighbour ranking by cosine similarity.
pub struct Corpus {
    documents: Vec<Document>,
    vectors: Vec<Vec<f32>>,
}

impl Corpus {
    pub fn new(documents: Vec<Document>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if documents.len() != vectors.len() {
            return Err(RagError::Corpus(format!(
                "{} documents but {} vectors",
                documents.len(),
                vectors.len()
            )));
        }
        Ok(Self { documents, vectors })
    }

    /// Load the JSON corpus and attach vectors, embedding what the cache lacks.
    pub async fn open(path: &Path, embedder: &dyn Embedder, cache: &EmbeddingCache) -> Result<Self> {
        let documents = load_documents(path)?;
        info!(path = %path.display(), records = documents.len(), "Loaded corpus");
        let vectors = index::build_vectors(&documents, embedder, cache).await?;
        Self::new(documents, vectors)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Document> {
        self.documents.get(position)
    }

    /// Every project with its document count, sorted by name.
    pub fn projects(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in &self.documents {
            *counts.entry(doc.metadata.project_label()).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect()
    }

    pub fn has_project(&self, project: &str) -> bool {
        self.documents
            .iter()
            .any(|d| d.metadata.project_label() == project)
    }

    /// Positions of documents whose project is in `projects`, in corpus order.
    pub fn filter_by_projects(&self, projects: &[String]) -> Vec<usize> {
        let wanted: HashSet<&str> = projects.iter().map(|p| p.as_str()).collect();
        self.documents
            .iter()
            .enumerate()
            .filter(|(_, d)| wanted.contains(d.metadata.project_label()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Rank `candidates` (or the whole corpus) by cosine similarity to `query`
    /// and keep the best `k`. Equal scores keep corpus order.
    pub fn nearest(&self, query: &[f32], k: usize, candidates: Option<&[usize]>) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = match candidates {
            Some(positions) => positions
                .iter()
                .filter_map(|&i| self.vectors.get(i).map(|v| (i, cosine_similarity(query, v))))
                .collect(),
            None => self
                .vectors
                .iter()
                .enumerate()
                .map(|(i, v)| (i, cosine_similarity(query, v)))
                .collect(),
        };

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}

/// Parse a JSON array of `{content, metadata}` records.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RagError::Corpus(format!("cannot read {}: {}", path.display(), e)))?;
    parse_documents(&raw)
}

pub fn parse_documents(raw: &str) -> Result<Vec<Document>> {
    serde_json::from_str(raw).map_err(|e| RagError::Corpus(format!("invalid corpus JSON: {}", e)))
}

/// Cosine similarity; zero when either vector has no magnitude or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
