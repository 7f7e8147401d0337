use crate::error::{Result, ShardError};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const DEFAULT_READ_WINDOW: usize = 256 * 1024;

/// FragmentStore keeps one node's fragments as flat files:
/// `{base_path}/{filename}_{index}.bin`.
///
/// Fragments are write-once. A second `put` to the same address fails even if
/// the payload is identical.
pub struct FragmentStore {
    base_path: PathBuf,
    read_window: usize,
}

impl FragmentStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        Self::with_read_window(base_path, DEFAULT_READ_WINDOW)
    }

    pub fn with_read_window(base_path: PathBuf, read_window: usize) -> Result<Self> {
        if read_window == 0 {
            return Err(ShardError::Config(
                "fragment read window must be positive".to_string(),
            ));
        }

        std::fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            read_window,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn read_window(&self) -> usize {
        self.read_window
    }

    pub async fn put(&self, filename: &str, index: u32, data: Bytes) -> Result<()> {
        let fragment_path = self.fragment_path(filename, index)?;
        if fs::try_exists(&fragment_path).await? {
            return Err(ShardError::FragmentExists {
                filename: filename.to_string(),
                index,
            });
        }

        let tmp_path = fragment_path.with_extension(format!("{}.tmp", ulid::Ulid::new()));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        // hard_link refuses to replace an existing target, which keeps the
        // write-once check race free between concurrent writers.
        let linked = fs::hard_link(&tmp_path, &fragment_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        match linked {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ShardError::FragmentExists {
                    filename: filename.to_string(),
                    index,
                });
            }
            Err(error) => return Err(error.into()),
        }

        tracing::info!("Stored fragment {} of {} ({} bytes)", index, filename, data.len());
        Ok(())
    }

    pub async fn open(&self, filename: &str, index: u32) -> Result<FragmentReader> {
        let fragment_path = self.fragment_path(filename, index)?;
        let file = match fs::File::open(&fragment_path).await {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(ShardError::FragmentNotFound {
                    filename: filename.to_string(),
                    index,
                });
            }
            Err(error) => return Err(error.into()),
        };

        Ok(FragmentReader {
            file,
            window: self.read_window,
        })
    }

    pub async fn delete(&self, filename: &str, index: u32) -> Result<()> {
        let fragment_path = self.fragment_path(filename, index)?;
        match fs::remove_file(&fragment_path).await {
            Ok(()) => {
                tracing::info!("Deleted fragment {} of {}", index, filename);
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(ShardError::FragmentNotFound {
                    filename: filename.to_string(),
                    index,
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn exists(&self, filename: &str, index: u32) -> bool {
        match self.fragment_path(filename, index) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub fn fragment_path(&self, filename: &str, index: u32) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.base_path.join(format!("{}_{}.bin", filename, index)))
    }
}

/// Sequential reader over one stored fragment, yielding at most `window`
/// bytes per call.
pub struct FragmentReader {
    file: fs::File,
    window: usize,
}

impl FragmentReader {
    pub async fn next_window(&mut self) -> Result<Option<Bytes>> {
        let mut buf = vec![0u8; self.window];
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.file.read(&mut buf[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }

        if filled == 0 {
            return Ok(None);
        }

        buf.truncate(filled);
        Ok(Some(Bytes::from(buf)))
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes>> {
        stream::try_unfold(self, |mut reader| async move {
            Ok(reader.next_window().await?.map(|window| (window, reader)))
        })
        .boxed()
    }
}

/// Reject names that are empty or could step outside a store directory.
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(ShardError::InvalidInput("filename cannot be empty".to_string()));
    }

    if filename == "." || filename == ".." || filename.contains(['/', '\\', '\0']) {
        return Err(ShardError::InvalidInput(format!(
            "invalid filename: {:?}",
            filename
        )));
    }

    Ok(())
}
