use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::debug_log;
use crate::error::PipelineError;

/// Single-writer guard for the data directory. Merge and distribute hold one
/// for their whole run; the lock file is removed when the guard drops.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        debug_log::log("LOCK", "ACQUIRING", &path.display().to_string());
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(PipelineError::Busy {
                    lock_path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let _ = writeln!(file, "{}", std::process::id());
        debug_log::log("LOCK", "ACQUIRED", &path.display().to_string());

        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        debug_log::log("LOCK", "RELEASED", &self.path.display().to_string());
    }
}
