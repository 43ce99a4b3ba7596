use crate::errors::Result;
use log::warn;
use std::fs;
use std::path::PathBuf;

/// Durable marker of the last successfully completed page for a named job.
///
/// `save` must only be called after the page's data has been handed to the
/// sink (persist-then-checkpoint): a checkpoint must never point past data
/// that was never saved.
pub trait CheckpointStore {
    fn load(&self, job_name: &str) -> Result<Option<u32>>;
    fn save(&self, job_name: &str, page_index: u32) -> Result<()>;
    /// Called only on terminal complete.
    fn clear(&self, job_name: &str) -> Result<()>;
}

/// File-backed checkpoint store: one `<job>.progress` file holding a single
/// plain-text integer, kept human-readable for operability.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir: PathBuf = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    fn path(&self, job_name: &str) -> PathBuf {
        self.dir.join(format!("{}.progress", job_name))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, job_name: &str) -> Result<Option<u32>> {
        let path = self.path(job_name);
        if !path.exists() {
            return Ok(None);
        }

        let text = fs::read_to_string(&path)?;
        match text.trim().parse::<u32>() {
            Ok(page) => Ok(Some(page)),
            Err(_) => {
                // A marker we cannot read is treated as absent; the job
                // re-extracts from page 1.
                warn!(
                    "Ignoring unreadable checkpoint {}: {:?}",
                    path.display(),
                    text.trim()
                );
                Ok(None)
            }
        }
    }

    fn save(&self, job_name: &str, page_index: u32) -> Result<()> {
        let path = self.path(job_name);
        let tmp_path = self.dir.join(format!("{}.progress.tmp", job_name));

        // Write-then-rename so a crash mid-write cannot corrupt the marker.
        fs::write(&tmp_path, page_index.to_string())?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn clear(&self, job_name: &str) -> Result<()> {
        let path = self.path(job_name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}
