use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct UploadStore {
    upload_dir: PathBuf,
    max_image_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: usize, limit: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredUpload {
    pub filename: String,
    pub path: PathBuf,
}

impl UploadStore {
    pub fn new(upload_dir: impl Into<PathBuf>, max_image_bytes: usize) -> Result<Self, StorageError> {
        let upload_dir = upload_dir.into();
        std::fs::create_dir_all(&upload_dir).map_err(|source| StorageError::Io {
            path: upload_dir.clone(),
            source,
        })?;
        Ok(Self {
            upload_dir,
            max_image_bytes,
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn max_image_bytes(&self) -> usize {
        self.max_image_bytes
    }

    /// `{8 hex chars}_{sanitized original name}`.
    pub fn generate_filename(original_name: &str) -> String {
        let prefix = Uuid::new_v4().simple().to_string();
        let safe: String = sanitize_filename::sanitize(original_name)
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        let safe = if safe.is_empty() { "upload".to_string() } else { safe };
        format!("{}_{}", &prefix[..8], safe)
    }

    /// The HTTP layer already stops oversized fields while streaming; this
    /// covers uploads handed to the pipeline directly.
    pub fn validate_image_size(&self, size: usize) -> Result<(), StorageError> {
        if size > self.max_image_bytes {
            return Err(StorageError::FileTooLarge {
                size,
                limit: self.max_image_bytes,
            });
        }
        Ok(())
    }

    pub fn store(&self, filename: &str, data: &[u8]) -> Result<StoredUpload, StorageError> {
        self.validate_image_size(data.len())?;

        let path = self.upload_dir.join(filename);
        std::fs::write(&path, data).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(StoredUpload {
            filename: filename.to_string(),
            path,
        })
    }
}
