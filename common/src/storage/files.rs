use std::{path::PathBuf, sync::Arc};

use bytes::Bytes;
use object_store::{
    local::LocalFileSystem, memory::InMemory, path::Path as ObjPath, ObjectStore, PutPayload,
};

use crate::{error::AppError, utils::config::AppConfig};

pub type DynStore = Arc<dyn ObjectStore>;

/// Stores raw source payloads under `STORAGE_ROOT/<source_id>.<ext>`.
/// PDFs keep their bytes, text sources keep the pasted text, url sources keep
/// the submitted URL string.
#[derive(Clone)]
pub struct SourceFileStore {
    store: DynStore,
}

impl SourceFileStore {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let base = PathBuf::from(&config.storage_root);
        std::fs::create_dir_all(&base)?;
        let store = LocalFileSystem::new_with_prefix(&base)?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// In-memory backend for tests.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
        }
    }

    fn location(source_id: &str, extension: &str) -> ObjPath {
        ObjPath::from(format!("{source_id}.{extension}"))
    }

    pub async fn put(
        &self,
        source_id: &str,
        extension: &str,
        data: Bytes,
    ) -> Result<(), AppError> {
        let location = Self::location(source_id, extension);
        self.store
            .put(&location, PutPayload::from_bytes(data))
            .await?;
        Ok(())
    }

    pub async fn get(&self, source_id: &str, extension: &str) -> Result<Bytes, AppError> {
        let location = Self::location(source_id, extension);
        let result = self.store.get(&location).await.map_err(|err| match err {
            object_store::Error::NotFound { .. } => {
                AppError::NotFound(format!("stored payload for source {source_id}"))
            }
            other => AppError::ObjectStore(other),
        })?;
        Ok(result.bytes().await?)
    }

    /// Removes the stored payload. Missing objects are fine: deletion must be
    /// idempotent so a cascade can re-run.
    pub async fn delete(&self, source_id: &str, extension: &str) -> Result<(), AppError> {
        let location = Self::location(source_id, extension);
        match self.store.delete(&location).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(AppError::ObjectStore(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let store = SourceFileStore::memory();
        store
            .put("src-1", "txt", Bytes::from_static(b"hello"))
            .await
            .expect("put");

        let payload = store.get("src-1", "txt").await.expect("get");
        assert_eq!(payload.as_ref(), b"hello");

        store.delete("src-1", "txt").await.expect("delete");
        assert!(matches!(
            store.get("src-1", "txt").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_missing_is_idempotent() {
        let store = SourceFileStore::memory();
        store.delete("missing", "pdf").await.expect("delete");
    }
}
