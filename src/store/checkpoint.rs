//! Durable position of the propagator in the rider change feed.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::AppError;
use crate::models::change::ResumeToken;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self) -> Result<Option<ResumeToken>, AppError>;
    async fn save(&self, token: ResumeToken) -> Result<(), AppError>;
}

#[derive(Default)]
pub struct MemoryCheckpoint {
    token: Mutex<Option<ResumeToken>>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoint {
    async fn load(&self) -> Result<Option<ResumeToken>, AppError> {
        self.token
            .lock()
            .map(|token| *token)
            .map_err(|_| AppError::Internal("checkpoint lock poisoned".to_string()))
    }

    async fn save(&self, token: ResumeToken) -> Result<(), AppError> {
        let mut current = self
            .token
            .lock()
            .map_err(|_| AppError::Internal("checkpoint lock poisoned".to_string()))?;
        *current = Some(token);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    resume_after: ResumeToken,
}

/// Stores the token as JSON. Writes go to a sibling temp file that is synced
/// and then renamed over the target, so readers see either the old or the new
/// checkpoint.
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpoint {
    async fn load(&self) -> Result<Option<ResumeToken>, AppError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AppError::Storage(format!(
                    "failed to read checkpoint {}: {err}",
                    self.path.display()
                )));
            }
        };

        let file: CheckpointFile = serde_json::from_slice(&raw).map_err(|err| {
            AppError::Storage(format!(
                "corrupt checkpoint {}: {err}",
                self.path.display()
            ))
        })?;

        Ok(Some(file.resume_after))
    }

    async fn save(&self, token: ResumeToken) -> Result<(), AppError> {
        let body = serde_json::to_vec(&CheckpointFile {
            resume_after: token,
        })
        .map_err(|err| AppError::Internal(format!("failed to encode checkpoint: {err}")))?;

        let temp_path = self.temp_path();
        write_synced(&temp_path, &body).await.map_err(|err| {
            AppError::Storage(format!(
                "failed to write checkpoint {}: {err}",
                temp_path.display()
            ))
        })?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|err| {
                AppError::Storage(format!(
                    "failed to move checkpoint into {}: {err}",
                    self.path.display()
                ))
            })
    }
}

async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}
