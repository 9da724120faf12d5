use crate::errors::{Result, TandemError};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Writes that never leave a half-written file behind
pub mod atomic_file {
    use super::*;
    use crate::utils::file_locking::FileLock;

    /// Serialize `data` as pretty JSON and swap it into `path` under its lock file
    pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(data)?;
        let _lock = FileLock::acquire(path)?;
        replace(path, content.as_bytes())
    }

    /// Write next to the target, then rename over it
    fn replace(path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.exists()) {
            fs::create_dir_all(parent)?;
        }

        let staging = path.with_extension("tmp");
        fs::write(&staging, content)?;
        if let Err(e) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(TandemError::state(format!(
                "Failed to replace {}: {e}",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Blocking work off the async runtime
pub mod async_ops {
    use super::*;
    use tokio::task;

    /// Run git work (commands, libgit2 calls, prompts) on the blocking pool
    pub async fn run_git_operation<F, R>(operation: F) -> Result<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        task::spawn_blocking(operation)
            .await
            .map_err(|e| TandemError::command(format!("Background task failed: {e}")))?
    }
}

/// Lock files guarding state writes and whole tandem runs
pub mod file_locking {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io::ErrorKind;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    /// Exclusive lock held as long as the value lives; the file is removed on drop
    #[derive(Debug)]
    pub struct FileLock {
        _file: File,
        path: PathBuf,
    }

    impl FileLock {
        const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
        const POLL_INTERVAL: Duration = Duration::from_millis(50);

        /// Lock `<file_path>.lock`, waiting up to five seconds
        pub fn acquire(file_path: &Path) -> Result<Self> {
            Self::acquire_with_timeout(file_path, Self::DEFAULT_TIMEOUT)
        }

        pub fn acquire_with_timeout(file_path: &Path, timeout: Duration) -> Result<Self> {
            let lock_path = file_path.with_extension("lock");
            let deadline = Instant::now() + timeout;

            loop {
                match Self::try_acquire(&lock_path) {
                    Ok(lock) => return Ok(lock),
                    Err(e) if Instant::now() >= deadline => {
                        return Err(TandemError::state(format!(
                            "Timed out after {}ms waiting for {}: {e}",
                            timeout.as_millis(),
                            lock_path.display()
                        )));
                    }
                    Err(_) => std::thread::sleep(Self::POLL_INTERVAL),
                }
            }
        }

        /// Create `lock_path` exclusively or fail right away
        pub fn try_acquire(lock_path: &Path) -> Result<Self> {
            if let Some(parent) = lock_path.parent().filter(|parent| !parent.exists()) {
                fs::create_dir_all(parent)?;
            }

            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(lock_path)
                .map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => TandemError::state(format!(
                        "{} exists; another tandem process may be running",
                        lock_path.display()
                    )),
                    _ => TandemError::Io(e),
                })?;

            Ok(Self {
                _file: file,
                path: lock_path.to_path_buf(),
            })
        }
    }

    impl Drop for FileLock {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }
}
