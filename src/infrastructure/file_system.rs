use crate::core::interfaces::FileSystemService;
use crate::utils::{IoOperation, PackError, Result};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystemService;

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .await
            .map_err(|e| PackError::io(path, IoOperation::Read, e))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            self.create_directory(parent).await?;
        }

        fs::write(path, content)
            .await
            .map_err(|e| PackError::io(path, IoOperation::Write, e))
    }

    async fn create_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| PackError::io(path, IoOperation::CreateDir, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)
            .await
            .map_err(|e| PackError::io(to, IoOperation::Rename, e))
    }

    async fn remove_directory(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PackError::io(path, IoOperation::Clean, e)),
        }
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PackError::io(path, IoOperation::Clean, e)),
        }
    }

    async fn clean_directory(&self, path: &Path) -> Result<usize> {
        let meta = match fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(PackError::io(path, IoOperation::Clean, e)),
        };

        // A linked output directory is unlinked, its target stays untouched.
        if meta.file_type().is_symlink() {
            remove_link(path).await?;
            return Ok(1);
        }
        if !meta.is_dir() {
            return Err(PackError::io(
                path,
                IoOperation::Clean,
                std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
            ));
        }

        let mut removed = 0;
        let mut entries = fs::read_dir(path)
            .await
            .map_err(|e| PackError::io(path, IoOperation::Clean, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PackError::io(path, IoOperation::Clean, e))?
        {
            let entry_path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| PackError::io(&entry_path, IoOperation::Clean, e))?;

            if file_type.is_symlink() {
                remove_link(&entry_path).await?;
            } else if file_type.is_dir() {
                // remove_dir_all unlinks nested symlinks without following them
                fs::remove_dir_all(&entry_path)
                    .await
                    .map_err(|e| PackError::io(&entry_path, IoOperation::Clean, e))?;
            } else {
                fs::remove_file(&entry_path)
                    .await
                    .map_err(|e| PackError::io(&entry_path, IoOperation::Clean, e))?;
            }
            removed += 1;
        }

        Ok(removed)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

async fn remove_link(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        // Directory links on Windows need remove_dir
        Err(_) => fs::remove_dir(path)
            .await
            .map_err(|e| PackError::io(path, IoOperation::Clean, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_operations() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let test_file = temp_dir.path().join("nested/test.txt");

        let content = "Hello, bundle!";
        fs_service.write_file(&test_file, content).await.unwrap();

        let read_content = fs_service.read_file(&test_file).await.unwrap();
        assert_eq!(content, read_content);
        assert!(fs_service.file_exists(&test_file));
        assert!(fs_service.dir_exists(&temp_dir.path().join("nested")));
    }

    #[tokio::test]
    async fn test_read_missing_file_reports_path() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let missing = temp_dir.path().join("missing.js");

        let err = fs_service.read_file(&missing).await.unwrap_err();
        match err {
            PackError::Io { path, operation, .. } => {
                assert_eq!(path, missing);
                assert_eq!(operation, IoOperation::Read);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_clean_missing_directory_is_noop() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let removed = fs_service
            .clean_directory(&temp_dir.path().join("dist"))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_clean_removes_entries_but_keeps_directory() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let dist = temp_dir.path().join("dist");
        fs_service.write_file(&dist.join("old.js"), "old").await.unwrap();
        fs_service.write_file(&dist.join("assets/a.css"), "a{}").await.unwrap();

        let removed = fs_service.clean_directory(&dist).await.unwrap();
        assert_eq!(removed, 2);
        assert!(dist.is_dir());
        assert!(!dist.join("old.js").exists());
        assert!(!dist.join("assets").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_does_not_follow_symlinks() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let outside = temp_dir.path().join("outside");
        fs_service.write_file(&outside.join("keep.txt"), "keep").await.unwrap();

        let dist = temp_dir.path().join("dist");
        fs_service.create_directory(&dist).await.unwrap();
        std::os::unix::fs::symlink(&outside, dist.join("link")).unwrap();

        fs_service.clean_directory(&dist).await.unwrap();
        assert!(!dist.join("link").exists());
        assert!(outside.join("keep.txt").exists());
    }
}
