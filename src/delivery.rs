//! Category-organised output store.
//!
//! [`StorageGateway`] is the boundary to wherever rendered documents are
//! filed. [`LocalFolderStore`] files them under `root/<Category>/`.
//! [`deliver`] writes one copy per category and reports each result
//! separately; a failed category never stops the others.

use crate::error::UploadError;
use crate::output::{CategoryDelivery, DeliveryStatus};
use crate::profile::Category;
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Opaque reference to a category folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderHandle {
    pub category: Category,
    pub id: String,
}

#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Return the folder for `category`, creating it only if it is missing.
    async fn ensure_folder(&self, category: Category) -> Result<FolderHandle, UploadError>;

    async fn exists(&self, folder: &FolderHandle, file_name: &str) -> Result<bool, UploadError>;

    async fn upload(&self, folder: &FolderHandle, file_name: &str, bytes: Vec<u8>) -> Result<(), UploadError>;
}

/// Deliver `bytes` as `file_name` into every category, skipping categories
/// that already hold a same-named file.
pub async fn deliver(
    store: &dyn StorageGateway,
    categories: &[Category],
    file_name: &str,
    bytes: &[u8],
) -> Vec<CategoryDelivery> {
    let mut results = Vec::with_capacity(categories.len());
    for &category in categories {
        let status = match deliver_one(store, category, file_name, bytes).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Delivery to {} failed: {}", category, e);
                DeliveryStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        results.push(CategoryDelivery {
            category,
            file_name: file_name.to_string(),
            status,
        });
    }
    results
}

async fn deliver_one(
    store: &dyn StorageGateway,
    category: Category,
    file_name: &str,
    bytes: &[u8],
) -> Result<DeliveryStatus, UploadError> {
    let folder = store.ensure_folder(category).await?;
    if store.exists(&folder, file_name).await? {
        info!("{}/{} already present, skipping upload", category, file_name);
        return Ok(DeliveryStatus::AlreadyPresent);
    }
    store.upload(&folder, file_name, bytes.to_vec()).await?;
    info!("Uploaded {}/{}", category, file_name);
    Ok(DeliveryStatus::Uploaded)
}

// ── Local filesystem store ───────────────────────────────────────────────

/// Stores files at `root/<Category label>/<file name>`.
#[derive(Debug, Clone)]
pub struct LocalFolderStore {
    root: PathBuf,
}

impl LocalFolderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn folder_path(&self, folder: &FolderHandle) -> PathBuf {
        self.root.join(&folder.id)
    }

    fn err(folder: &str, file_name: &str, detail: impl ToString) -> UploadError {
        UploadError {
            folder: folder.to_string(),
            file_name: file_name.to_string(),
            detail: detail.to_string(),
        }
    }
}

#[async_trait]
impl StorageGateway for LocalFolderStore {
    async fn ensure_folder(&self, category: Category) -> Result<FolderHandle, UploadError> {
        let handle = FolderHandle {
            category,
            id: category.label().to_string(),
        };
        let path = self.folder_path(&handle);
        let present = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Self::err(&handle.id, "", e))?;
        if !present {
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| Self::err(&handle.id, "", e))?;
            debug!("Created folder {}", path.display());
        }
        Ok(handle)
    }

    async fn exists(&self, folder: &FolderHandle, file_name: &str) -> Result<bool, UploadError> {
        tokio::fs::try_exists(self.folder_path(folder).join(file_name))
            .await
            .map_err(|e| Self::err(&folder.id, file_name, e))
    }

    async fn upload(&self, folder: &FolderHandle, file_name: &str, bytes: Vec<u8>) -> Result<(), UploadError> {
        let dir = self.folder_path(folder);
        let target = dir.join(file_name);
        let folder_id = folder.id.clone();
        let name = file_name.to_string();

        // Temp file in the same directory, then rename, so a reader never sees a partial file.
        tokio::task::spawn_blocking(move || {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| Self::err(&folder_id, &name, e))?;
            tmp.write_all(&bytes).map_err(|e| Self::err(&folder_id, &name, e))?;
            tmp.persist(&target)
                .map_err(|e| Self::err(&folder_id, &name, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| Self::err(&folder.id, file_name, format!("write task panicked: {e}")))?
    }
}
