use crate::model::Flag;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("failed to read the flags: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode the flags: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("flag repository is unavailable: {0}")]
    Unavailable(String),
}

/// The store the engine loads its flags from.
#[async_trait]
pub trait FlagRepository: Send + Sync {
    /// Every live flag, in a single consistent read.
    async fn find_all(&self) -> Result<Vec<Flag>, RepositoryError>;
}

/// A repository kept in memory whose content can be replaced wholesale.
#[derive(Debug, Default)]
pub struct InMemoryFlagRepository {
    flags: RwLock<Vec<Flag>>,
}

impl InMemoryFlagRepository {
    pub fn new(flags: Vec<Flag>) -> Self {
        Self {
            flags: RwLock::new(flags),
        }
    }

    pub fn replace(&self, flags: Vec<Flag>) {
        *self.flags.write() = flags;
    }
}

#[async_trait]
impl FlagRepository for InMemoryFlagRepository {
    async fn find_all(&self) -> Result<Vec<Flag>, RepositoryError> {
        Ok(self.flags.read().clone())
    }
}

/// A repository backed by a JSON file holding an array of stored flags.
///
/// The file is read again on every call, so an external process can update the flags by
/// rewriting it.
#[derive(Clone, Debug)]
pub struct JsonFileFlagRepository {
    path: PathBuf,
}

impl JsonFileFlagRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FlagRepository for JsonFileFlagRepository {
    async fn find_all(&self) -> Result<Vec<Flag>, RepositoryError> {
        let content = tokio::fs::read(&self.path).await?;
        let flags: Vec<Flag> = serde_json::from_slice(&content)?;
        Ok(flags
            .into_iter()
            .filter(|flag| flag.deleted_at.is_none())
            .collect())
    }
}
