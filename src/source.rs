// src/source.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Where part bytes come from. Parts are read on demand so a large file is
//! never held in memory whole.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

#[async_trait]
pub trait UploadSource: Send + Sync {
    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Bytes in `[start, end)`.
    async fn read_range(&self, start: u64, end: u64) -> std::io::Result<Bytes>;
}

/// A local file, opened per read so concurrent workers never share a cursor.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self {
            path,
            size: meta.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl UploadSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, start: u64, end: u64) -> std::io::Result<Bytes> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

#[async_trait]
impl UploadSource for Bytes {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    async fn read_range(&self, start: u64, end: u64) -> std::io::Result<Bytes> {
        if end > self.len() as u64 || start > end {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("range {}..{} outside buffer of {}", start, end, self.len()),
            ));
        }
        Ok(self.slice(start as usize..end as usize))
    }
}
