use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::StorageConfig;
use crate::errors::AppError;

const ALLOWED_EXTENSIONS: [&str; 2] = ["pdf", "csv"];

/// On-disk result of a stored submission upload.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub file_name: String,
    pub stored_path: PathBuf,
    pub size_bytes: i64,
}

/// Lower-cased extension of the upload, if it is on the allow list.
pub fn allowed_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Write an upload to the submission directory. The caller owns the
/// lifecycle: if the database transaction that references the file fails,
/// it must call [`remove_file`] so no orphan remains on disk.
pub async fn save_submission(
    config: &StorageConfig,
    task_id: Uuid,
    file_name: &str,
    bytes: &[u8],
) -> Result<StoredFile, AppError> {
    let ext = allowed_extension(file_name).ok_or_else(|| {
        AppError::bad_request(format!(
            "file type not allowed, expected one of: {}",
            ALLOWED_EXTENSIONS.join(", ")
        ))
    })?;

    if bytes.is_empty() {
        return Err(AppError::bad_request("uploaded file is empty"));
    }
    if bytes.len() > config.max_upload_bytes {
        return Err(AppError::payload_too_large(format!(
            "file exceeds {} bytes",
            config.max_upload_bytes
        )));
    }

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .map_err(|err| AppError::internal(format!("failed to create upload dir: {err}")))?;

    let stored_name = format!("{}_{}.{}", task_id, Uuid::new_v4(), ext);
    let stored_path = config.upload_dir.join(stored_name);

    tokio::fs::write(&stored_path, bytes)
        .await
        .map_err(|err| AppError::internal(format!("failed to store upload: {err}")))?;

    Ok(StoredFile {
        file_name: file_name.to_string(),
        stored_path,
        size_bytes: bytes.len() as i64,
    })
}

/// Best-effort removal, used both for cleanup after a failed transaction
/// and when deleting a task with a submission.
pub async fn remove_file(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove stored file");
    }
}

pub async fn read_file(path: &Path) -> Result<Vec<u8>, AppError> {
    tokio::fs::read(path)
        .await
        .map_err(|err| AppError::internal(format!("failed to read stored file: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> StorageConfig {
        StorageConfig {
            upload_dir: dir.to_path_buf(),
            max_upload_bytes: 16,
        }
    }

    #[test]
    fn extension_allow_list() {
        assert_eq!(allowed_extension("report.pdf"), Some("pdf".to_string()));
        assert_eq!(allowed_extension("data.CSV"), Some("csv".to_string()));
        assert_eq!(allowed_extension("notes.txt"), None);
        assert_eq!(allowed_extension("no_extension"), None);
        assert_eq!(allowed_extension("archive.pdf.exe"), None);
    }

    #[tokio::test]
    async fn save_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let stored = save_submission(&cfg, Uuid::new_v4(), "report.pdf", b"hello")
            .await
            .unwrap();
        assert!(stored.stored_path.exists());
        assert_eq!(stored.size_bytes, 5);

        remove_file(&stored.stored_path).await;
        assert!(!stored.stored_path.exists());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let err = save_submission(&cfg, Uuid::new_v4(), "big.csv", &[0u8; 32]).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn disallowed_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let err = save_submission(&cfg, Uuid::new_v4(), "script.sh", b"echo").await;
        assert!(err.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
