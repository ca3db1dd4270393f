//! File synchronization tasks.
//!
//! `UpdateFile` carries the new content as a binary payload; an `UpdateFile` with no
//! payload means the file was superseded by nothing and is removed. `DeleteFile`
//! always removes. Paths are relative to the node's file root and may not escape it.

use crate::error::{FarmError, FarmResult};
use crate::tasks::payload::BinaryPayload;
use crate::tasks::types::{Task, TaskInvocation, TaskTarget};

use anyhow::Result;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub const UPDATE_FILE: &str = "UpdateFile";
pub const DELETE_FILE: &str = "DeleteFile";

pub struct FileSync {
    root: PathBuf,
}

impl FileSync {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self { root: root.into() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a farm-relative path onto this node's file root.
    ///
    /// `type_tag` names the task asking, for the error it reports.
    pub fn resolve(&self, type_tag: &str, relative: &str) -> FarmResult<PathBuf> {
        let candidate = Path::new(relative);
        let mut resolved = self.root.clone();
        let mut depth = 0usize;

        for component in candidate.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(FarmError::MalformedTaskPayload {
                        type_tag: type_tag.to_string(),
                        reason: format!("path '{}' escapes the file root", relative),
                    });
                }
            }
        }

        if depth == 0 {
            return Err(FarmError::MalformedTaskPayload {
                type_tag: type_tag.to_string(),
                reason: "empty file path".to_string(),
            });
        }
        Ok(resolved)
    }

    /// Builds the task announcing new content for `relative`.
    pub fn update_task(relative: &str, content: impl Into<BinaryPayload>) -> Task {
        Task::new(UPDATE_FILE, TaskTarget::AllOthers)
            .arg(relative)
            .binary(content)
    }

    /// Builds the task announcing that `relative` was deleted.
    pub fn delete_task(relative: &str) -> Task {
        Task::new(DELETE_FILE, TaskTarget::AllOthers).arg(relative)
    }

    pub async fn apply_update(&self, invocation: TaskInvocation) -> Result<()> {
        let relative = invocation.arg(0)?;
        let path = self.resolve(UPDATE_FILE, relative)?;

        match &invocation.binary_data {
            Some(content) => self.write_atomically(&path, content.as_bytes()).await,
            None => self.remove(&path).await,
        }
    }

    pub async fn apply_delete(&self, invocation: TaskInvocation) -> Result<()> {
        let path = self.resolve(DELETE_FILE, invocation.arg(0)?)?;
        self.remove(&path).await
    }

    async fn write_atomically(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("path {} has no file name", path.display()))?;
        let mut staging_name = file_name.to_os_string();
        staging_name.push(format!(".{}.sync", uuid::Uuid::new_v4().simple()));
        let staging = path.with_file_name(staging_name);

        tokio::fs::write(&staging, content).await?;
        if let Err(e) = tokio::fs::rename(&staging, path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        tracing::debug!("Wrote synchronized file {} ({} bytes)", path.display(), content.len());
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!("Removed synchronized file {}", path.display());
                Ok(())
            }
            // Already gone on this node.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
