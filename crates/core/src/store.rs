use crate::error::IndexError;
use crate::models::DocumentId;
use crate::retrieval;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

pub const INDEX_EXTENSION: &str = "json";

/// One document's chunk texts and their vectors, persisted as a unit.
/// `texts[i]` is the chunk whose embedding is `vectors[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredIndex {
    pub texts: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub position: usize,
    pub score: f32,
    pub text: String,
}

impl StoredIndex {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }

    fn validate(&self, document_id: &str) -> Result<(), IndexError> {
        if self.texts.len() != self.vectors.len() {
            return Err(IndexError::Corrupt {
                document_id: document_id.to_string(),
                details: format!(
                    "{} texts but {} vectors",
                    self.texts.len(),
                    self.vectors.len()
                ),
            });
        }

        if let Some(expected) = self.dimensions() {
            if let Some(position) = self.vectors.iter().position(|v| v.len() != expected) {
                return Err(IndexError::Corrupt {
                    document_id: document_id.to_string(),
                    details: format!(
                        "vector {position} has {} dimensions, expected {expected}",
                        self.vectors[position].len()
                    ),
                });
            }
        }

        Ok(())
    }

    /// The `k` chunks most similar to `query`, best first.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        if let Some(expected) = self.dimensions() {
            if expected != query.len() {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        Ok(retrieval::top_k(&self.vectors, query, k)
            .into_iter()
            .map(|hit| RetrievedChunk {
                position: hit.position,
                score: hit.score,
                text: self.texts[hit.position].clone(),
            })
            .collect())
    }
}

/// Directory of per-document index files, `<root>/<document_id>.json`.
#[derive(Debug, Clone)]
pub struct VectorStore {
    root: PathBuf,
}

impl VectorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn index_path(&self, document_id: &DocumentId) -> PathBuf {
        self.root.join(index_file_name(document_id))
    }

    /// Writes the index, replacing any previous one for the same document.
    /// The file is written beside its final name and renamed into place.
    /// The returned path is absolute so it stays valid from any working
    /// directory.
    pub async fn save(
        &self,
        document_id: &DocumentId,
        texts: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<PathBuf, IndexError> {
        let index = StoredIndex { texts, vectors };
        index.validate(document_id.as_str())?;

        fs::create_dir_all(&self.root).await?;
        let root = fs::canonicalize(&self.root).await?;
        let path = root.join(index_file_name(document_id));
        let staging = root.join(format!(".{}.{}.tmp", document_id.as_str(), Uuid::new_v4()));

        fs::write(&staging, serde_json::to_vec(&index)?).await?;
        if let Err(error) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(error.into());
        }

        info!(
            document_id = %document_id,
            chunks = index.len(),
            path = %path.display(),
            "vector index saved"
        );
        Ok(path)
    }

    pub async fn load(&self, document_id: &DocumentId) -> Result<StoredIndex, IndexError> {
        self.load_from(document_id, &self.index_path(document_id)).await
    }

    /// Loads an index from an explicit path, e.g. one recorded in the catalog.
    pub async fn load_from(
        &self,
        document_id: &DocumentId,
        path: &Path,
    ) -> Result<StoredIndex, IndexError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(IndexError::NotFound {
                    document_id: document_id.to_string(),
                });
            }
            Err(error) => return Err(error.into()),
        };

        let index: StoredIndex =
            serde_json::from_slice(&bytes).map_err(|error| IndexError::Corrupt {
                document_id: document_id.to_string(),
                details: error.to_string(),
            })?;
        index.validate(document_id.as_str())?;

        debug!(document_id = %document_id, chunks = index.len(), "vector index loaded");
        Ok(index)
    }

    pub async fn retrieve(
        &self,
        document_id: &DocumentId,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        self.load(document_id).await?.top_k(query, k)
    }

    /// Removes the index. Returns whether a file was actually deleted.
    pub async fn delete(&self, document_id: &DocumentId) -> Result<bool, IndexError> {
        match fs::remove_file(self.index_path(document_id)).await {
            Ok(()) => {
                info!(document_id = %document_id, "vector index deleted");
                Ok(true)
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }
}

fn index_file_name(document_id: &DocumentId) -> String {
    format!("{}.{INDEX_EXTENSION}", document_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(value: &str) -> DocumentId {
        DocumentId::new(value).expect("valid id")
    }

    fn sample() -> (Vec<String>, Vec<Vec<f32>>) {
        (
            vec![
                "hemoglobin 13.5".to_string(),
                "wbc 7900".to_string(),
                "tsh 2.1".to_string(),
                "vitamin d 18".to_string(),
            ],
            vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![0.6, 0.8],
                vec![0.8, 0.6],
            ],
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path());
        let (texts, vectors) = sample();

        let path = store.save(&id("apc"), texts.clone(), vectors.clone()).await?;
        assert_eq!(path, std::fs::canonicalize(dir.path())?.join("apc.json"));

        let loaded = store.load(&id("apc")).await?;
        assert_eq!(loaded.texts, texts);
        assert_eq!(loaded.vectors, vectors);
        Ok(())
    }

    #[tokio::test]
    async fn persisted_layout_has_exactly_two_fields() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path());
        let (texts, vectors) = sample();
        let path = store.save(&id("apc"), texts, vectors).await?;

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(path)?)?;
        let object = raw.as_object().ok_or("index is not an object")?;
        let mut keys: Vec<&String> = object.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["texts", "vectors"]);
        Ok(())
    }

    #[tokio::test]
    async fn save_overwrites_previous_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path());
        let (texts, vectors) = sample();
        store.save(&id("apc"), texts, vectors).await?;
        store
            .save(&id("apc"), vec!["only".to_string()], vec![vec![1.0, 0.0]])
            .await?;

        let loaded = store.load(&id("apc")).await?;
        assert_eq!(loaded.texts, vec!["only".to_string()]);
        let leftovers = std::fs::read_dir(dir.path())?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_index_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let store = VectorStore::new(dir.path());
        let result = store.load(&id("ghost")).await;
        assert!(matches!(result, Err(IndexError::NotFound { .. })));
    }

    #[tokio::test]
    async fn mismatched_lengths_on_disk_are_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path());
        std::fs::write(
            dir.path().join("apc.json"),
            br#"{"texts":["a","b"],"vectors":[[1.0,0.0]]}"#,
        )?;
        assert!(matches!(
            store.load(&id("apc")).await,
            Err(IndexError::Corrupt { .. })
        ));

        std::fs::write(dir.path().join("apc.json"), b"not json")?;
        assert!(matches!(
            store.load(&id("apc")).await,
            Err(IndexError::Corrupt { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn save_refuses_mismatched_input() {
        let dir = tempdir().expect("tempdir");
        let store = VectorStore::new(dir.path());
        let result = store
            .save(&id("apc"), vec!["a".to_string()], Vec::new())
            .await;
        assert!(matches!(result, Err(IndexError::Corrupt { .. })));
        assert!(!store.index_path(&id("apc")).exists());
    }

    #[tokio::test]
    async fn retrieve_returns_top_three_in_score_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path());
        let (texts, vectors) = sample();
        store.save(&id("apc"), texts, vectors).await?;

        let hits = store.retrieve(&id("apc"), &[1.0, 0.0], 3).await?;
        let texts: Vec<&str> = hits.iter().map(|hit| hit.text.as_str()).collect();
        assert_eq!(texts, vec!["hemoglobin 13.5", "vitamin d 18", "tsh 2.1"]);
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
        Ok(())
    }

    #[tokio::test]
    async fn retrieve_rejects_wrong_query_dimension() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path());
        let (texts, vectors) = sample();
        store.save(&id("apc"), texts, vectors).await?;

        let result = store.retrieve(&id("apc"), &[1.0, 0.0, 0.0], 3).await;
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn delete_reports_whether_index_existed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = VectorStore::new(dir.path());
        let (texts, vectors) = sample();
        store.save(&id("apc"), texts, vectors).await?;

        assert!(store.delete(&id("apc")).await?);
        assert!(!store.delete(&id("apc")).await?);
        assert!(matches!(
            store.load(&id("apc")).await,
            Err(IndexError::NotFound { .. })
        ));
        Ok(())
    }
}
