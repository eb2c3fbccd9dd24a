//! Filesystem seam for the dedication procedure.

use std::io;
use std::path::Path;

use async_trait::async_trait;

/// Every filesystem effect the dedication procedure performs.
#[async_trait]
pub trait DedicationFs: Send + Sync {
    /// Whether space can be reserved on this host at all.
    fn supported(&self) -> bool {
        true
    }

    /// Size of the file at `path`, `None` if it does not exist.
    async fn file_size(&self, path: &Path) -> io::Result<Option<u64>>;

    async fn is_dir(&self, path: &Path) -> bool;

    /// Create or grow `path` to `len` bytes of reserved space.
    async fn allocate(&self, path: &Path, len: u64) -> io::Result<()>;

    async fn truncate(&self, path: &Path, len: u64) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    async fn check_access(&self, path: &Path) -> io::Result<()>;

    /// Remove the link itself, never its target.
    async fn remove_link(&self, path: &Path) -> io::Result<()>;

    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;
}

/// The real host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFs;

#[async_trait]
impl DedicationFs for HostFs {
    fn supported(&self) -> bool {
        cfg!(target_os = "linux")
    }

    async fn file_size(&self, path: &Path) -> io::Result<Option<u64>> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn is_dir(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    }

    async fn allocate(&self, path: &Path, len: u64) -> io::Result<()> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || fallocate(&path, len))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }

    async fn truncate(&self, path: &Path, len: u64) -> io::Result<()> {
        let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
        file.set_len(len).await?;
        file.sync_all().await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn check_access(&self, path: &Path) -> io::Result<()> {
        tokio::fs::metadata(path).await.map(|_| ())
    }

    async fn remove_link(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            tokio::fs::symlink(target, link).await
        }
        #[cfg(not(unix))]
        {
            let _ = (target, link);
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "symlinks are not supported on this platform",
            ))
        }
    }
}

/// Reserve `len` bytes for `path` with fallocate(2), creating the file.
///
/// Mode 0 both reserves blocks and extends the file size; it fails with
/// ENOSPC without touching the file when the space is not available.
#[cfg(target_os = "linux")]
fn fallocate(path: &Path, len: u64) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let len = libc::off_t::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "size exceeds off_t"))?;
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    // SAFETY: the descriptor stays open for the duration of the call.
    let rc = unsafe { libc::fallocate(file.as_raw_fd(), 0, 0, len) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    file.sync_all()
}

#[cfg(not(target_os = "linux"))]
fn fallocate(_path: &Path, _len: u64) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "fallocate is only available on Linux",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_size_of_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let size = HostFs.file_size(&dir.path().join("absent")).await.unwrap();
        assert_eq!(size, None);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_allocate_reserves_requested_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages");

        match HostFs.allocate(&path, 64 * 1024).await {
            Ok(()) => {}
            // Some test filesystems cannot reserve space.
            Err(e) if e.raw_os_error() == Some(libc::EOPNOTSUPP) => return,
            Err(e) => panic!("fallocate failed: {e}"),
        }
        assert_eq!(HostFs.file_size(&path).await.unwrap(), Some(64 * 1024));

        HostFs.allocate(&path, 128 * 1024).await.unwrap();
        assert_eq!(HostFs.file_size(&path).await.unwrap(), Some(128 * 1024));

        HostFs.truncate(&path, 64 * 1024).await.unwrap();
        assert_eq!(HostFs.file_size(&path).await.unwrap(), Some(64 * 1024));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remove_link_keeps_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        tokio::fs::write(&target, b"data").await.unwrap();

        HostFs.symlink(&target, &link).await.unwrap();
        HostFs.remove_link(&link).await.unwrap();

        assert!(HostFs.check_access(&target).await.is_ok());
        assert!(tokio::fs::symlink_metadata(&link).await.is_err());
    }

    #[tokio::test]
    async fn test_is_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HostFs.is_dir(dir.path()).await);
        assert!(!HostFs.is_dir(&dir.path().join("missing")).await);
    }
}
