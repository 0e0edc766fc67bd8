//! Random-access sources for part data.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A sized source the uploader can read ranges from.
#[async_trait]
pub trait PartSource: Send + Sync {
    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    async fn read_range(&self, offset: u64, len: u64) -> io::Result<Bytes>;
}

#[async_trait]
impl PartSource for Bytes {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    async fn read_range(&self, offset: u64, len: u64) -> io::Result<Bytes> {
        let start = usize::try_from(offset).map_err(|_| out_of_range(offset, len))?;
        let end = start
            .checked_add(usize::try_from(len).map_err(|_| out_of_range(offset, len))?)
            .filter(|end| *end <= self.len())
            .ok_or_else(|| out_of_range(offset, len))?;
        Ok(self.slice(start..end))
    }
}

/// A file on disk, read one range at a time.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// Open a file and record its size.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }

        Ok(Self {
            path,
            size: metadata.len(),
        })
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PartSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, offset: u64, len: u64) -> io::Result<Bytes> {
        if offset.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(out_of_range(offset, len));
        }
        let capacity = usize::try_from(len).map_err(|_| out_of_range(offset, len))?;

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; capacity];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

fn out_of_range(offset: u64, len: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("range {}..{} is outside the source", offset, offset.saturating_add(len)),
    )
}
