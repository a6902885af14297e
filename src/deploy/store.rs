// ABOUTME: File-backed persistence for deployment state and history.
// ABOUTME: Writes go to a temp file first and are renamed into place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::types::ResourceName;

use super::history::{HistoryEntry, MAX_HISTORY};
use super::state::DeploymentState;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> StoreError + 'a {
    move |source| StoreError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// State and history files for one service.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    service: ResourceName,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>, service: ResourceName) -> Self {
        Self {
            dir: dir.into(),
            service,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn service(&self) -> &ResourceName {
        &self.service
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(format!("{}.state.json", self.service))
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(format!("{}.history.json", self.service))
    }

    /// Saved state, or `None` before the first transition.
    pub fn load(&self) -> Result<Option<DeploymentState>, StoreError> {
        read_json(&self.state_path())
    }

    pub fn save(&self, state: &DeploymentState) -> Result<(), StoreError> {
        write_json_atomic(&self.state_path(), state)
    }

    /// Record a transition at the head of the history.
    pub fn append_history(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut entries = self.read_history()?;
        entries.insert(0, entry);
        entries.truncate(MAX_HISTORY);
        write_json_atomic(&self.history_path(), &entries)
    }

    /// Up to `limit` entries, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut entries = self.read_history()?;
        entries.truncate(limit);
        Ok(entries)
    }

    /// Release serving traffic as of the latest transition.
    pub fn current_release(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .read_history()?
            .into_iter()
            .next()
            .and_then(|entry| entry.release))
    }

    /// The last release that served traffic before the current one.
    pub fn previous_release(&self) -> Result<Option<String>, StoreError> {
        let entries = self.read_history()?;
        let Some(current) = entries.first().map(|e| e.release.clone()) else {
            return Ok(None);
        };
        Ok(entries
            .into_iter()
            .filter_map(|e| e.release)
            .find(|release| Some(release) != current.as_ref()))
    }

    fn read_history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(read_json(&self.history_path())?.unwrap_or_default())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error("read", path)(e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error("create", parent))?;
    }

    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    fs::write(&tmp, json).map_err(io_error("write", &tmp))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_error("replace", path)(e));
    }
    Ok(())
}
