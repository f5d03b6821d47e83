//! Job-scoped scratch space and file helpers.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Create a unique scratch directory for one job under `work_dir`.
///
/// The directory is removed when the returned guard drops, so concurrent
/// jobs never share intermediate files.
pub fn job_scratch_dir(work_dir: &Path, job_tag: &str) -> MediaResult<TempDir> {
    std::fs::create_dir_all(work_dir)?;
    let dir = tempfile::Builder::new()
        .prefix(&format!("job-{}-", job_tag))
        .tempdir_in(work_dir)?;
    Ok(dir)
}

/// Fail unless `path` exists and holds at least `min_bytes`.
pub async fn ensure_min_size(path: &Path, min_bytes: u64) -> MediaResult<u64> {
    let meta = fs::metadata(path)
        .await
        .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?;
    let size = meta.len();
    if size < min_bytes {
        return Err(MediaError::OutputTooSmall {
            path: path.to_path_buf(),
            size,
            min: min_bytes,
        });
    }
    Ok(size)
}

/// Size of an existing file, or `FileNotFound`.
pub async fn file_size(path: &Path) -> MediaResult<u64> {
    fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))
}

/// Move a file from `src` to `dst`, falling back to copy+delete across devices.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            let staged = staging_path(dst);
            fs::copy(src, &staged).await?;
            if let Err(e) = fs::rename(&staged, dst).await {
                let _ = fs::remove_file(&staged).await;
                return Err(e.into());
            }
            if let Err(e) = fs::remove_file(src).await {
                tracing::warn!("Failed to remove {} after copy: {}", src.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn staging_path(dst: &Path) -> PathBuf {
    let mut name = dst.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dst.with_file_name(name)
}

/// EXDEV (cross-device link).
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scratch_dirs_are_unique_and_cleaned() {
        let root = TempDir::new().unwrap();
        let a = job_scratch_dir(root.path(), "7").unwrap();
        let b = job_scratch_dir(root.path(), "7").unwrap();
        assert_ne!(a.path(), b.path());

        let kept = a.path().to_path_buf();
        drop(a);
        assert!(!kept.exists());
        assert!(b.path().exists());
    }

    #[tokio::test]
    async fn test_ensure_min_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.mp4");

        assert!(matches!(
            ensure_min_size(&path, 1024).await,
            Err(MediaError::FileNotFound(_))
        ));

        fs::write(&path, vec![0u8; 100]).await.unwrap();
        assert!(matches!(
            ensure_min_size(&path, 1024).await,
            Err(MediaError::OutputTooSmall { size: 100, .. })
        ));

        fs::write(&path, vec![0u8; 2048]).await.unwrap();
        assert_eq!(ensure_min_size(&path, 1024).await.unwrap(), 2048);
    }

    #[tokio::test]
    async fn test_move_file_creates_parent() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.webm");
        let dst = dir.path().join("nested").join("dest.webm");
        fs::write(&src, b"frames").await.unwrap();

        move_file(&src, &dst).await.unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"frames");
    }

    #[test]
    fn test_cross_device_detection() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}
