//! Named disks that storage attachments are read from.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::MailError;

#[async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn read(&self, path: &str) -> Result<Vec<u8>, MailError>;

    /// MIME type of the file, when the disk can tell.
    async fn mime_type(&self, path: &str) -> Result<Option<String>, MailError> {
        Ok(guess_mime(path))
    }
}

pub(crate) fn guess_mime(path: impl AsRef<Path>) -> Option<String> {
    mime_guess::from_path(path).first().map(|mime| mime.to_string())
}

/// A disk rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, MailError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            tracing::warn!(root = %self.root.display(), path, "path escapes storage root");
            return Err(MailError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{path} is outside of the storage root"),
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn read(&self, path: &str) -> Result<Vec<u8>, MailError> {
        Ok(tokio::fs::read(self.resolve(path)?).await?)
    }
}

/// A disk held in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files
            .write()
            .await
            .insert(path.into(), contents.into());
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, path: &str) -> Result<Vec<u8>, MailError> {
        self.files.read().await.get(path).cloned().ok_or_else(|| {
            MailError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{path} not found"),
            ))
        })
    }
}

/// Disks by name. The first disk registered is the default unless
/// another one is picked with [`Disks::default_disk`].
#[derive(Clone, Default)]
pub struct Disks {
    default: Option<String>,
    disks: HashMap<String, Arc<dyn Storage>>,
}

impl Disks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, disk: impl Storage) -> Self {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.disks.insert(name, Arc::new(disk));
        self
    }

    pub fn default_disk(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Resolve a disk by name, or the default disk for `None`.
    pub fn disk(&self, name: Option<&str>) -> Result<Arc<dyn Storage>, MailError> {
        let name = name.or(self.default.as_deref()).unwrap_or("default");
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| MailError::DiskNotDefined(name.to_string()))
    }
}

impl std::fmt::Debug for Disks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disks")
            .field("default", &self.default)
            .field("disks", &self.disks.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_mime_from_extension() {
        assert_eq!(guess_mime("reports/q3.pdf").as_deref(), Some("application/pdf"));
        assert_eq!(guess_mime("notes"), None);
    }

    #[test]
    fn local_storage_refuses_parent_components() {
        let disk = LocalStorage::new("/srv/files");
        assert!(disk.resolve("../etc/passwd").is_err());
        assert_eq!(
            disk.resolve("/invoices/1.pdf").unwrap(),
            PathBuf::from("/srv/files/invoices/1.pdf")
        );
    }

    #[test]
    fn first_disk_is_default() {
        let disks = Disks::new()
            .with("local", MemoryStorage::new())
            .with("archive", MemoryStorage::new());
        assert_eq!(disks.default_name(), Some("local"));
        assert!(disks.disk(None).is_ok());
        assert!(matches!(
            disks.disk(Some("s3")),
            Err(MailError::DiskNotDefined(name)) if name == "s3"
        ));
    }
}
