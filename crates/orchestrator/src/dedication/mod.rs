//! Dedicating disk space to the pod.
//!
//! The procedure grows (or creates) `<mount>/xandeum-pages` by the requested
//! number of gigabytes and publishes it through a well-known symlink. Once the
//! space has been reserved, any later failure undoes the reservation: a new
//! file is removed, an existing one is truncated back to its original size.

mod fs;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use node_core::{BYTES_PER_GB, DEDICATED_FILE_NAME};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub use fs::{DedicationFs, HostFs};

use crate::error::DedicationError;

/// A completed dedication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dedication {
    pub path: PathBuf,
    pub symlink: PathBuf,
    /// Total size of the backing file after the call.
    pub size_bytes: u64,
}

/// What the target looked like before allocation, for rollback.
#[derive(Debug, Clone)]
struct DedicationRecord {
    target: PathBuf,
    existed_before: bool,
    original_size: u64,
}

impl DedicationRecord {
    async fn rollback(&self, fs: &dyn DedicationFs) -> io::Result<()> {
        if self.existed_before {
            fs.truncate(&self.target, self.original_size).await
        } else {
            match fs.remove_file(&self.target).await {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            }
        }
    }
}

pub struct Dedicator {
    fs: Arc<dyn DedicationFs>,
    link_path: PathBuf,
    /// Serializes runs that publish through `link_path`.
    lock: Mutex<()>,
}

impl Dedicator {
    pub fn new(fs: Arc<dyn DedicationFs>, link_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            link_path: link_path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Dedicator over the host filesystem.
    pub fn host(link_path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(HostFs), link_path)
    }

    pub fn link_path(&self) -> &Path {
        &self.link_path
    }

    pub fn target_path(mount: &Path) -> PathBuf {
        mount.join(DEDICATED_FILE_NAME)
    }

    /// Current size of the dedicated file under `mount`, 0 if there is none.
    pub async fn dedicated_bytes(&self, mount: &Path) -> Result<u64, DedicationError> {
        let target = Self::target_path(mount);
        self.fs
            .file_size(&target)
            .await
            .map(|size| size.unwrap_or(0))
            .map_err(|source| DedicationError::Inspect {
                path: target,
                source,
            })
    }

    /// Add `size_gb` gigabytes to the dedicated file under `mount`.
    pub async fn dedicate(
        &self,
        size_gb: u64,
        mount: &Path,
    ) -> Result<Dedication, DedicationError> {
        if !self.fs.supported() {
            return Err(DedicationError::UnsupportedPlatform);
        }
        let additional = self.validate(size_gb, mount).await?;

        let _serialized = self.lock.lock().await;
        let target = Self::target_path(mount);

        let existing = self
            .fs
            .file_size(&target)
            .await
            .map_err(|source| DedicationError::Inspect {
                path: target.clone(),
                source,
            })?;
        let record = DedicationRecord {
            target: target.clone(),
            existed_before: existing.is_some(),
            original_size: existing.unwrap_or(0),
        };
        let new_size = record.original_size.checked_add(additional).ok_or_else(|| {
            DedicationError::InvalidRequest("resulting file size is too large".to_string())
        })?;

        info!(
            path = %target.display(),
            original_size = record.original_size,
            new_size,
            "Allocating dedicated space"
        );
        if let Err(err) = self.fs.allocate(&target, new_size).await {
            if !record.existed_before {
                // fallocate may leave an empty file behind.
                if let Err(e) = self.fs.remove_file(&target).await {
                    debug!(path = %target.display(), error = %e, "No allocation leftover to remove");
                }
            }
            warn!(path = %target.display(), error = %err, "Allocation failed");
            return Err(DedicationError::Allocation(err));
        }

        if let Err(err) = self.publish(&target).await {
            return Err(self.compensate(&record, err).await);
        }

        info!(
            path = %target.display(),
            symlink = %self.link_path.display(),
            "Dedicated space published"
        );
        Ok(Dedication {
            path: target,
            symlink: self.link_path.clone(),
            size_bytes: new_size,
        })
    }

    async fn validate(&self, size_gb: u64, mount: &Path) -> Result<u64, DedicationError> {
        if size_gb == 0 {
            return Err(DedicationError::InvalidRequest(
                "size must be at least 1 GB".to_string(),
            ));
        }
        if !mount.is_absolute() {
            return Err(DedicationError::InvalidRequest(format!(
                "mount must be an absolute path: {}",
                mount.display()
            )));
        }
        if !self.fs.is_dir(mount).await {
            return Err(DedicationError::InvalidRequest(format!(
                "mount is not a directory: {}",
                mount.display()
            )));
        }
        size_gb.checked_mul(BYTES_PER_GB).ok_or_else(|| {
            DedicationError::InvalidRequest(format!("size of {size_gb} GB is too large"))
        })
    }

    async fn publish(&self, target: &Path) -> Result<(), DedicationError> {
        if let Some(dir) = self.link_path.parent() {
            self.fs
                .create_dir_all(dir)
                .await
                .map_err(DedicationError::Directory)?;
        }

        self.fs
            .check_access(target)
            .await
            .map_err(DedicationError::TargetInaccessible)?;

        match self.fs.remove_link(&self.link_path).await {
            Ok(()) => debug!(symlink = %self.link_path.display(), "Removed existing symlink"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(DedicationError::LinkRemoval(e)),
        }

        self.fs
            .symlink(target, &self.link_path)
            .await
            .map_err(DedicationError::from_link_creation)
    }

    async fn compensate(
        &self,
        record: &DedicationRecord,
        err: DedicationError,
    ) -> DedicationError {
        warn!(
            path = %record.target.display(),
            error = %err,
            "Publishing failed, reverting allocation"
        );
        match record.rollback(self.fs.as_ref()).await {
            Ok(()) => err,
            Err(rollback) => {
                error!(
                    path = %record.target.display(),
                    error = %rollback,
                    "Failed to revert file size"
                );
                DedicationError::RollbackFailed {
                    original: Box::new(err),
                    rollback,
                }
            }
        }
    }
}
