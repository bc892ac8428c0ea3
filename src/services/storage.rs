use async_trait::async_trait;
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("File {original_name} exceeds the maximum allowed size of {limit} bytes")]
    TooLarge { original_name: String, limit: usize },

    #[error("Storage name {0} is already taken")]
    NameCollision(String),
}

/// A file that has been fully written to the storage namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Name the client supplied for the file
    pub original_name: String,
    /// Generated name inside the storage namespace
    pub storage_name: String,
    pub path: PathBuf,
    pub size: u64,
}

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Drains `reader` into a freshly named file. Nothing is left behind on failure.
    async fn store_stream<'a>(
        &self,
        original_name: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StoredUpload, StorageError>;

    /// Removes exactly the named file. A missing file is an error.
    async fn delete(&self, storage_name: &str) -> Result<(), StorageError>;

    async fn exists(&self, storage_name: &str) -> Result<bool, StorageError>;

    fn path_for(&self, storage_name: &str) -> PathBuf;

    async fn health_check(&self) -> bool;
}

/// Flat directory of retained uploads on local disk.
pub struct LocalStorageService {
    root: PathBuf,
    max_file_size: usize,
}

impl LocalStorageService {
    pub fn new(root: PathBuf, max_file_size: usize) -> Self {
        Self {
            root,
            max_file_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the storage directory if it does not exist yet.
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Writes under a caller-chosen name; never replaces an existing file.
    async fn store_as<'a>(
        &self,
        storage_name: String,
        original_name: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StoredUpload, StorageError> {
        let path = self.path_for(&storage_name);

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::NameCollision(storage_name));
            }
            Err(e) => return Err(e.into()),
        };

        match drain_into(reader, &mut file, original_name, self.max_file_size).await {
            Ok(size) => {
                tracing::debug!(
                    "Stored {} as {} ({} bytes)",
                    original_name,
                    storage_name,
                    size
                );
                Ok(StoredUpload {
                    original_name: original_name.to_string(),
                    storage_name,
                    path,
                    size,
                })
            }
            Err(e) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&path).await {
                    tracing::warn!(
                        "Failed to remove partial file {}: {}",
                        path.display(),
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn store_stream<'a>(
        &self,
        original_name: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StoredUpload, StorageError> {
        self.store_as(generate_storage_name(original_name), original_name, reader)
            .await
    }

    async fn delete(&self, storage_name: &str) -> Result<(), StorageError> {
        fs::remove_file(self.path_for(storage_name)).await?;
        Ok(())
    }

    async fn exists(&self, storage_name: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.path_for(storage_name)).await?)
    }

    fn path_for(&self, storage_name: &str) -> PathBuf {
        self.root.join(storage_name)
    }

    async fn health_check(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

async fn drain_into<R>(
    reader: R,
    file: &mut fs::File,
    original_name: &str,
    limit: usize,
) -> Result<u64, StorageError>
where
    R: AsyncRead + Unpin,
{
    // Read one byte past the limit so an oversized stream is detectable.
    let mut limited = reader.take(limit as u64 + 1);
    let written = tokio::io::copy(&mut limited, file).await?;
    if written > limit as u64 {
        return Err(StorageError::TooLarge {
            original_name: original_name.to_string(),
            limit,
        });
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// `<unix-millis>-<random hex>[.<ext>]`
///
/// The random token keeps two uploads landing in the same millisecond apart.
pub fn generate_storage_name(original_name: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let token: u32 = rand::random();
    match extension_of(original_name) {
        Some(ext) => format!("{millis}-{token:08x}.{ext}"),
        None => format!("{millis}-{token:08x}"),
    }
}

fn extension_of(original_name: &str) -> Option<String> {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let (_, ext) = base.rsplit_once('.')?;
    let ext: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    (!ext.is_empty()).then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Yields some bytes, then fails like a dropped client connection.
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "client went away",
                )));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_extension_handling() {
        assert_eq!(extension_of("photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("../../etc/passwd"), None);
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("dir.d/noext"), None);
        assert_eq!(extension_of("scan.P N-G").as_deref(), Some("png"));
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_storage_name_shape() {
        let name = generate_storage_name("cat.png");
        let (stem, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "png");
        let (millis, token) = stem.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(token.len(), 8);
        assert!(!generate_storage_name("README").contains('.'));
    }

    #[test]
    fn test_sequential_names_do_not_collide() {
        let first = generate_storage_name("a.png");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = generate_storage_name("a.png");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_store_stream_writes_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path().to_path_buf(), 1024);

        let stored = storage
            .store_stream("photo.png", Box::new(&b"image bytes"[..]))
            .await
            .unwrap();

        assert_eq!(stored.original_name, "photo.png");
        assert!(stored.storage_name.ends_with(".png"));
        assert_eq!(stored.size, 11);
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"image bytes");
        assert!(storage.exists(&stored.storage_name).await.unwrap());
    }

    #[tokio::test]
    async fn test_oversized_stream_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path().to_path_buf(), 4);

        let err = storage
            .store_stream("big.png", Box::new(&b"too many bytes"[..]))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::TooLarge { limit: 4, .. }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_exact_limit_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path().to_path_buf(), 4);

        let stored = storage
            .store_stream("ok.png", Box::new(&b"four"[..]))
            .await
            .unwrap();
        assert_eq!(stored.size, 4);
    }

    #[tokio::test]
    async fn test_broken_stream_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path().to_path_buf(), 1024);

        let err = storage
            .store_stream("photo.png", Box::new(BrokenReader { sent: false }))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path().join("absent"), 1024);

        let err = storage
            .store_stream("photo.png", Box::new(&b"x"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
        assert!(!storage.health_check().await);

        storage.init().await.unwrap();
        assert!(storage.health_check().await);
    }

    #[tokio::test]
    async fn test_taken_name_is_a_collision_not_an_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path().to_path_buf(), 1024);
        std::fs::write(dir.path().join("1-deadbeef.png"), b"already here").unwrap();

        let err = storage
            .store_as(
                "1-deadbeef.png".to_string(),
                "photo.png",
                Box::new(&b"new bytes"[..]),
            )
            .await
            .unwrap_err();

        match err {
            StorageError::NameCollision(name) => assert_eq!(name, "1-deadbeef.png"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            std::fs::read(dir.path().join("1-deadbeef.png")).unwrap(),
            b"already here"
        );
        assert_eq!(entries(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorageService::new(dir.path().to_path_buf(), 1024);

        let stored = storage
            .store_stream("photo.png", Box::new(&b"x"[..]))
            .await
            .unwrap();
        storage.delete(&stored.storage_name).await.unwrap();
        assert!(!storage.exists(&stored.storage_name).await.unwrap());

        let err = storage.delete(&stored.storage_name).await.unwrap_err();
        match err {
            StorageError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }
}
