//! Post-download install hook
//!
//! A bound folder may carry an executable file (`.rose_install` by default)
//! that is run with the folder as working directory after each download.
//! The hook runs detached; its failures are logged and never reach the
//! caller.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Install hook runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallHook {
    filename: String,
}

impl InstallHook {
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Hook path for a folder
    #[must_use]
    pub fn path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.filename)
    }

    /// Check if the folder has a hook file with an execute bit
    #[must_use]
    pub fn is_runnable(&self, dir: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(self.path(dir)) else {
            return false;
        };
        if !meta.is_file() {
            return false;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode() & 0o111 != 0
        }
        #[cfg(not(unix))]
        {
            true
        }
    }

    /// Start the hook in the background
    ///
    /// Returns `None` when the folder has no runnable hook. Must be called
    /// from within a tokio runtime.
    pub fn spawn(&self, dir: &Path) -> Option<JoinHandle<()>> {
        let path = self.path(dir);
        if !self.is_runnable(dir) {
            if path.exists() {
                warn!(hook = %path.display(), "install hook is not executable; skipping");
            }
            return None;
        }

        let mut cmd = Command::new(&path);
        cmd.current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(hook = %path.display(), error = %err, "failed to start install hook");
                return None;
            }
        };
        info!(hook = %path.display(), "install hook started");

        Some(tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(hook = %path.display(), "install hook finished"),
                Ok(status) => warn!(hook = %path.display(), %status, "install hook failed"),
                Err(err) => warn!(hook = %path.display(), error = %err, "install hook did not run"),
            }
        }))
    }
}

impl Default for InstallHook {
    fn default() -> Self {
        Self::new(".rose_install")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_hook_is_not_runnable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!InstallHook::default().is_runnable(dir.path()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn executable_hook_runs_in_folder() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let hook = InstallHook::default();
        let script = hook.path(dir.path());
        std::fs::write(&script, "#!/bin/sh\necho done > installed.txt\n").unwrap();

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!hook.is_runnable(dir.path()));
        assert!(hook.spawn(dir.path()).is_none());

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let handle = hook.spawn(dir.path()).expect("hook should start");
        handle.await.unwrap();
        assert!(dir.path().join("installed.txt").exists());
    }
}
