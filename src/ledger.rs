//! Durable set of submission tokens that have already been delivered.
//!
//! The ledger is the first line of defence against duplicate deliveries;
//! the per-category existence check in [`crate::delivery`] is the second.
//! A crash between delivery and `record` means the next run delivers
//! again, and the existence check turns that into a no-op.

use crate::error::LedgerError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

#[async_trait]
pub trait ProcessingLedger: Send + Sync {
    async fn has(&self, token: &str) -> Result<bool, LedgerError>;

    /// Add `token`. Recording a token that is already present is a no-op.
    async fn record(&self, token: &str) -> Result<(), LedgerError>;
}

/// Append-only line file, one token per line, cached in memory.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    tokens: Mutex<HashSet<String>>,
}

impl FileLedger {
    /// Load an existing ledger, or start an empty one if the file is absent.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let tokens = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(source) => return Err(LedgerError::Io { path, source }),
        };
        debug!("Ledger {} holds {} token(s)", path.display(), tokens.len());
        Ok(Self {
            path,
            tokens: Mutex::new(tokens),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ProcessingLedger for FileLedger {
    async fn has(&self, token: &str) -> Result<bool, LedgerError> {
        Ok(self.tokens.lock().await.contains(token.trim()))
    }

    async fn record(&self, token: &str) -> Result<(), LedgerError> {
        let token = token.trim();
        if token.is_empty() || token.contains(['\n', '\r']) {
            return Err(LedgerError::InvalidToken(token.to_string()));
        }

        // Held across the write so two records of the same token cannot both append.
        let mut tokens = self.tokens.lock().await;
        if tokens.contains(token) {
            return Ok(());
        }

        let io = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io)?;
        file.write_all(format!("{}\n", token).as_bytes()).await.map_err(io)?;
        file.flush().await.map_err(io)?;

        tokens.insert(token.to_string());
        debug!("Ledger recorded token {}", token);
        Ok(())
    }
}
