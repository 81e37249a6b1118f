use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::artifacts::Artifact;
use crate::drivers::{DriverError, EmbeddingDriver};

pub const DEFAULT_TASK_MEMORY_NAME: &str = "TaskMemory";

#[derive(Clone, Debug, PartialEq)]
pub struct QueryMatch {
    pub artifact: Artifact,
    pub score: f32,
}

#[derive(Clone, Debug)]
struct StoredArtifact {
    artifact: Artifact,
    embedding: Vec<f32>,
}

/// In-memory vector store for one namespace of off-prompt artifacts.
#[derive(Clone)]
pub struct TextArtifactStorage {
    embedding_driver: Arc<dyn EmbeddingDriver>,
    entries: Vec<StoredArtifact>,
}

impl TextArtifactStorage {
    pub fn new(embedding_driver: Arc<dyn EmbeddingDriver>) -> Self {
        Self { embedding_driver, entries: Vec::new() }
    }

    pub fn store(&mut self, artifact: Artifact) -> Result<(), DriverError> {
        let embedding = self.embedding_driver.embed_text(&artifact.to_text())?;
        self.entries.push(StoredArtifact { artifact, embedding });
        Ok(())
    }

    /// Up to `top_n` artifacts ranked by cosine similarity to `query`;
    /// ties keep storage order.
    pub fn query(&self, query: &str, top_n: usize) -> Result<Vec<QueryMatch>, DriverError> {
        let query_embedding = self.embedding_driver.embed_text(query)?;
        let mut matches: Vec<QueryMatch> = self
            .entries
            .iter()
            .map(|entry| QueryMatch {
                artifact: entry.artifact.clone(),
                score: cosine_similarity(&query_embedding, &entry.embedding),
            })
            .collect();
        matches.sort_by(|left, right| right.score.total_cmp(&left.score));
        matches.truncate(top_n);
        Ok(matches)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.iter().map(|entry| &entry.artifact)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for TextArtifactStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextArtifactStorage")
            .field("embedding_driver", &self.embedding_driver.name())
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Namespaced store for tool outputs kept out of the prompt.
#[derive(Clone)]
pub struct TaskMemory {
    name: String,
    embedding_driver: Arc<dyn EmbeddingDriver>,
    namespaces: IndexMap<String, TextArtifactStorage>,
}

impl TaskMemory {
    pub fn new(name: impl Into<String>, embedding_driver: Arc<dyn EmbeddingDriver>) -> Self {
        Self { name: name.into(), embedding_driver, namespaces: IndexMap::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store_artifact(
        &mut self,
        namespace: &str,
        artifact: Artifact,
    ) -> Result<(), DriverError> {
        let storage = self
            .namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| TextArtifactStorage::new(Arc::clone(&self.embedding_driver)));
        storage.store(artifact)?;
        debug!(
            event_name = "memory.task.stored",
            memory = %self.name,
            namespace,
            "artifact stored off prompt"
        );
        Ok(())
    }

    /// Unknown namespaces answer with no matches.
    pub fn query(
        &self,
        namespace: &str,
        query: &str,
        top_n: usize,
    ) -> Result<Vec<QueryMatch>, DriverError> {
        match self.namespaces.get(namespace) {
            Some(storage) => storage.query(query, top_n),
            None => Ok(Vec::new()),
        }
    }

    pub fn namespace_artifacts(&self, namespace: &str) -> Vec<&Artifact> {
        self.namespaces
            .get(namespace)
            .map(|storage| storage.artifacts().collect())
            .unwrap_or_default()
    }

    /// Namespaces in the order they were first written.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    /// Text a task outputs in place of an artifact it stored here.
    pub fn pointer_text(&self, tool: &str, namespace: &str) -> String {
        format!(
            "Output of \"{tool}\" was stored in memory \"{}\" with namespace \"{namespace}\"",
            self.name
        )
    }
}

impl fmt::Debug for TaskMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskMemory")
            .field("name", &self.name)
            .field("namespaces", &self.namespaces)
            .finish()
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(l, r)| l * r).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}
