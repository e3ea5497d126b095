use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const STAGING_PREFIX: &str = ".staging-";

/// File operations confined to the installation directory.
pub struct FileSystemManager {
    root: PathBuf,
}

impl FileSystemManager {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn create_root(&self) -> Result<()> {
        if !self.root.exists() {
            info!("Creating installation directory: {}", self.root.display());
        }

        std::fs::create_dir_all(&self.root).with_context(|| {
            format!(
                "Failed to create installation directory: {}",
                self.root.display()
            )
        })
    }

    /// Fresh directory inside the root for writing a full set of files
    /// before any of them replaces a live one.
    pub fn create_staging_dir(&self) -> Result<PathBuf> {
        let staging = self
            .root
            .join(format!("{}{}", STAGING_PREFIX, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&staging)
            .with_context(|| format!("Failed to create staging directory: {}", staging.display()))?;
        debug!("Staging in {}", staging.display());
        Ok(staging)
    }

    /// Move `names` from `staging` into the root, then drop `staging`.
    /// Renames stay within one filesystem.
    pub fn promote(&self, staging: &Path, names: &[&str]) -> Result<()> {
        for name in names {
            let from = staging.join(name);
            let to = self.root.join(name);
            std::fs::rename(&from, &to)
                .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))?;
        }
        self.remove_dir(staging)
    }

    pub fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        debug!("Writing file: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write file: {}", path.display()))?;

        Ok(())
    }

    pub fn make_executable(&self, path: &Path) -> Result<()> {
        debug!("Making file executable: {}", path.display());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = std::fs::metadata(path)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(permissions.mode() | 0o111);
            std::fs::set_permissions(path, permissions)
                .with_context(|| format!("Failed to set permissions for: {}", path.display()))?;
        }

        Ok(())
    }

    /// Remove a directory, retrying a few times for transient failures.
    pub fn remove_dir(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }

        let mut attempts = 0;
        let max_attempts = 3;

        loop {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => {
                    debug!("Removed {}", dir.display());
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(anyhow::anyhow!(
                            "Failed to remove {} after {} attempts: {}",
                            dir.display(),
                            max_attempts,
                            e
                        ));
                    }
                    warn!("Removal attempt {} failed, retrying: {}", attempts, e);
                    std::thread::sleep(std::time::Duration::from_millis(500));
                }
            }
        }
    }

    /// Remove staging directories left behind by an interrupted run.
    pub fn remove_stale_staging(&self) -> Result<usize> {
        let mut removed = 0;
        if !self.root.exists() {
            return Ok(removed);
        }

        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read directory: {}", self.root.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() && entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                warn!("Removing leftover staging directory {}", entry.path().display());
                self.remove_dir(&entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Regular files under the root, relative to it, sorted.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.with_context(|| format!("Failed to walk {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root)?;
            let relative = relative.to_string_lossy().into_owned();
            if relative.starts_with(STAGING_PREFIX) {
                continue;
            }
            files.push(relative);
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staging_and_promote() {
        let dir = TempDir::new().unwrap();
        let fs_manager = FileSystemManager::new(dir.path().join("grid"));
        fs_manager.create_root().unwrap();

        let staging = fs_manager.create_staging_dir().unwrap();
        fs_manager.write_file(&staging.join("a.txt"), b"a").unwrap();
        fs_manager.write_file(&staging.join("b.txt"), b"b").unwrap();
        fs_manager.promote(&staging, &["a.txt", "b.txt"]).unwrap();

        assert!(!staging.exists());
        assert_eq!(fs_manager.list_files().unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_stale_staging_is_removed() {
        let dir = TempDir::new().unwrap();
        let fs_manager = FileSystemManager::new(dir.path().to_path_buf());
        fs_manager.create_staging_dir().unwrap();
        fs_manager.create_staging_dir().unwrap();

        assert_eq!(fs_manager.remove_stale_staging().unwrap(), 2);
        assert!(fs_manager.list_files().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let fs_manager = FileSystemManager::new(dir.path().to_path_buf());
        let script = fs_manager.path("manage.sh");
        fs_manager.write_file(&script, b"#!/bin/sh\n").unwrap();
        fs_manager.make_executable(&script).unwrap();

        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
