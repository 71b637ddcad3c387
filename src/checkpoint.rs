//! Durable job state: a text blob plus a JSON metadata sidecar.
//!
//! Each job writes two files with stable names, `{genre}_{id}.txt` and
//! `{genre}_{id}_meta.json`, overwritten in full on every checkpoint so a
//! retried save is idempotent. Writes go to a temp file first and rename
//! into place; a crash mid-save leaves the previous checkpoint intact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::CheckpointError;
use crate::setup::NovelSetup;

/// Everything needed to resume a job where it left off.
#[derive(Debug, Clone)]
pub struct CheckpointState {
    pub setup: NovelSetup,
    pub text: String,
    pub model: String,
    pub target_length: usize,
}

/// The metadata sidecar. The text itself lives in the `.txt` blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub setup: NovelSetup,
    pub model: String,
    pub target_length: usize,
    pub current_length: usize,
    pub updated_at: DateTime<Utc>,
}

/// Persistence seam for the generation loop.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError>;
}

/// Filesystem-backed store writing into one output directory.
pub struct FsCheckpointStore {
    dir: PathBuf,
    // Serializes saves so a pool-wide save-all never interleaves with a
    // job's own checkpoint of the same files.
    save_lock: Mutex<()>,
}

impl FsCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            save_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(setup: &NovelSetup) -> String {
        let genre: String = setup
            .genre
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}_{}", genre, setup.id.simple())
    }

    pub fn text_path(&self, setup: &NovelSetup) -> PathBuf {
        self.dir.join(format!("{}.txt", Self::stem(setup)))
    }

    pub fn meta_path(&self, setup: &NovelSetup) -> PathBuf {
        self.dir.join(format!("{}_meta.json", Self::stem(setup)))
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
        let tmp = path.with_extension("tmp");
        let map_err = |source: std::io::Error, p: &Path| CheckpointError::Write {
            path: p.display().to_string(),
            source,
        };
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| map_err(e, &tmp))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| map_err(e, path))
    }

    /// Load a checkpoint from its text file path; the metadata sidecar must
    /// sit next to it.
    pub async fn load(text_path: &Path) -> Result<CheckpointState, CheckpointError> {
        let meta_path = meta_sibling(text_path).ok_or_else(|| CheckpointError::NotResumable {
            reason: format!("{} is not a checkpoint text file", text_path.display()),
        })?;
        if !meta_path.exists() {
            return Err(CheckpointError::NotResumable {
                reason: format!("missing metadata sidecar {}", meta_path.display()),
            });
        }

        let read_err = |source: std::io::Error, p: &Path| CheckpointError::Read {
            path: p.display().to_string(),
            source,
        };
        let text = tokio::fs::read_to_string(text_path)
            .await
            .map_err(|e| read_err(e, text_path))?;
        let meta_raw = tokio::fs::read_to_string(&meta_path)
            .await
            .map_err(|e| read_err(e, &meta_path))?;
        let meta: CheckpointMeta = serde_json::from_str(&meta_raw)?;

        info!(
            path = %text_path.display(),
            chars = text.len(),
            genre = %meta.setup.genre,
            "loaded checkpoint"
        );
        Ok(CheckpointState {
            setup: meta.setup,
            text,
            model: meta.model,
            target_length: meta.target_length,
        })
    }

    /// Find resumable checkpoints in `dir`: every `.txt` file with a
    /// metadata sidecar, skipping aggregate `summary*` artifacts.
    pub fn discover(dir: &Path) -> Result<Vec<PathBuf>, CheckpointError> {
        let pattern = dir.join("*.txt");
        let entries = glob::glob(&pattern.to_string_lossy()).map_err(|e| {
            CheckpointError::NotResumable {
                reason: format!("bad directory pattern: {e}"),
            }
        })?;

        let mut found = Vec::new();
        for entry in entries.flatten() {
            let name = entry
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if name.starts_with("summary") {
                continue;
            }
            match meta_sibling(&entry) {
                Some(meta) if meta.exists() => found.push(entry),
                _ => debug!(path = %entry.display(), "skipping text file without metadata"),
            }
        }
        found.sort();
        Ok(found)
    }
}

fn meta_sibling(text_path: &Path) -> Option<PathBuf> {
    let stem = text_path.file_stem()?.to_string_lossy();
    Some(text_path.with_file_name(format!("{stem}_meta.json")))
}

#[async_trait::async_trait]
impl CheckpointStore for FsCheckpointStore {
    async fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        let _guard = self.save_lock.lock().await;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::Write {
                path: self.dir.display().to_string(),
                source: e,
            })?;

        let meta = CheckpointMeta {
            setup: state.setup.clone(),
            model: state.model.clone(),
            target_length: state.target_length,
            current_length: state.text.len(),
            updated_at: Utc::now(),
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta)?;

        self.write_atomic(&self.text_path(&state.setup), state.text.as_bytes())
            .await?;
        self.write_atomic(&self.meta_path(&state.setup), &meta_bytes)
            .await?;

        debug!(
            genre = %state.setup.genre,
            id = %state.setup.id,
            chars = state.text.len(),
            "checkpoint written"
        );
        Ok(())
    }
}
