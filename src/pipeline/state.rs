//! State threaded through pipeline steps, and the vector store it carries.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::text::{bag_of_words, cosine};

/// Similarity search over remembered text.
pub trait VectorStore: Send + Sync {
    /// Add a document; returns the store size afterwards.
    fn add(&self, text: &str) -> usize;

    /// Up to `k` documents ranked by similarity, highest first. Zero-score
    /// documents are omitted.
    fn search(&self, query: &str, k: usize) -> Vec<(String, f64)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute every embedding; returns the number of documents.
    fn reindex(&self) -> usize;
}

struct Document {
    text: String,
    embedding: HashMap<String, f64>,
}

/// Bag-of-words store kept in process memory.
#[derive(Default)]
pub struct InMemoryVectorStore {
    docs: Mutex<Vec<Document>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn add(&self, text: &str) -> usize {
        let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        docs.push(Document {
            text: text.to_string(),
            embedding: bag_of_words(text),
        });
        docs.len()
    }

    fn search(&self, query: &str, k: usize) -> Vec<(String, f64)> {
        let q = bag_of_words(query);
        let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<(String, f64)> = docs
            .iter()
            .map(|d| (d.text.clone(), cosine(&q, &d.embedding)))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(k);
        hits
    }

    fn len(&self) -> usize {
        self.docs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn reindex(&self) -> usize {
        let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        for d in docs.iter_mut() {
            d.embedding = bag_of_words(&d.text);
        }
        docs.len()
    }
}

/// Mutable record carried through a chain of pipeline steps.
///
/// Created once per process; survives across turns.
#[derive(Clone)]
pub struct PipelineState {
    pub query: String,
    pub prompt: String,
    pub output: String,
    pub topic: String,
    pub store: Arc<dyn VectorStore>,
}

impl PipelineState {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            query: String::new(),
            prompt: String::new(),
            output: String::new(),
            topic: String::new(),
            store,
        }
    }
}

impl fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineState")
            .field("query", &self.query)
            .field("prompt", &self.prompt)
            .field("output", &self.output)
            .field("topic", &self.topic)
            .field("store_len", &self.store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_ranks_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.add("the borrow checker enforces ownership");
        store.add("tomatoes grow in summer");
        store.add("ownership and borrowing in rust");

        let hits = store.search("rust ownership", 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "ownership and borrowing in rust");
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn state_clones_share_the_store() {
        let state = PipelineState::new(Arc::new(InMemoryVectorStore::new()));
        let copy = state.clone();
        copy.store.add("shared");
        assert_eq!(state.store.len(), 1);
        assert_eq!(state.store.reindex(), 1);
    }
}
