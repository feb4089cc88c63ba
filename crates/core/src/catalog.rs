use crate::error::CatalogError;
use crate::models::{DocumentId, DocumentRecord};
use crate::traits::DocumentCatalog;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: RwLock<BTreeMap<DocumentId, DocumentRecord>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentCatalog for InMemoryCatalog {
    async fn record(&self, record: DocumentRecord) -> Result<(), CatalogError> {
        self.records
            .write()
            .await
            .insert(record.document_id.clone(), record);
        Ok(())
    }

    async fn resolve(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<DocumentRecord>, CatalogError> {
        Ok(self.records.read().await.get(document_id).cloned())
    }

    async fn remove(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<DocumentRecord>, CatalogError> {
        Ok(self.records.write().await.remove(document_id))
    }
}

/// Catalog persisted as one JSON map keyed by document id. Every mutation
/// rewrites the file under a process-local lock.
#[derive(Debug)]
pub struct JsonFileCatalog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn list(&self) -> Result<Vec<DocumentRecord>, CatalogError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.into_values().collect())
    }

    async fn read_all(&self) -> Result<BTreeMap<DocumentId, DocumentRecord>, CatalogError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(error) => Err(error.into()),
        }
    }

    async fn write_all(
        &self,
        records: &BTreeMap<DocumentId, DocumentRecord>,
    ) -> Result<(), CatalogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let staging = self.path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&staging, serde_json::to_vec_pretty(records)?).await?;
        fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentCatalog for JsonFileCatalog {
    async fn record(&self, record: DocumentRecord) -> Result<(), CatalogError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        records.insert(record.document_id.clone(), record);
        self.write_all(&records).await
    }

    async fn resolve(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<DocumentRecord>, CatalogError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(document_id))
    }

    async fn remove(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<DocumentRecord>, CatalogError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        let removed = records.remove(document_id);
        if removed.is_some() {
            self.write_all(&records).await?;
        }
        Ok(removed)
    }
}
