use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::store::StoreError;

/// A directory the client keeps its state files in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Open `root`, creating it if needed. Fails unless it is a writable directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        ensure_writable_dir(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Replace `name` with `content`. Readers see either the old or the new file, never a mix.
    pub fn replace(&self, name: &str, content: &str) -> Result<PathBuf, StoreError> {
        ensure_writable_dir(&self.root)?;
        let target = self.file(name);
        let mut staged = NamedTempFile::new_in(&self.root)?;
        staged.write_all(content.as_bytes())?;
        staged.flush()?;
        staged.as_file_mut().sync_all()?;
        staged
            .persist(&target)
            .map_err(|err| StoreError::Io(err.error))?;
        Ok(target)
    }
}

fn ensure_writable_dir(dir: &Path) -> Result<(), StoreError> {
    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => {
            return Err(StoreError::StateDir(format!("{dir:?} is not a directory")));
        }
        Ok(_) => {}
        Err(_) => {
            fs::create_dir_all(dir).map_err(|err| StoreError::StateDir(err.to_string()))?;
        }
    }
    NamedTempFile::new_in(dir).map_err(|err| StoreError::StateDir(err.to_string()))?;
    Ok(())
}
