//! Cross-process lock around heavy tasks
//!
//! Each invocation has its own `TaskOrchestrator`, so two processes (a cron
//! run and a manual one) would otherwise rewrite the hosts file at the same
//! time. The lock is an advisory `flock` on a file next to the configuration
//! document and is released when the holder exits, even on a crash.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use ptaccel_core::Error;

/// Held for the duration of one heavy task
#[derive(Debug)]
pub struct TaskLock {
    file: File,
    path: PathBuf,
}

impl TaskLock {
    /// Take the lock without waiting
    ///
    /// # Errors
    ///
    /// `TaskAlreadyRunning` when another process holds it; `Io` when the
    /// lock file cannot be opened.
    pub fn acquire(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive().map_err(|_| {
            Error::TaskAlreadyRunning(format!(
                "另一个ptaccel进程正在执行任务 (lockfile: {})",
                path.display()
            ))
        })?;

        // pid of the holder, for operators
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        tracing::debug!("Task lock {} acquired", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for TaskLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release task lock {}: {}", self.path.display(), e);
        }
    }
}
