//! File operations under the storage server's local root.
//!
//! Every remote path is interpreted relative to the root; components cannot
//! contain separators, so resolved paths never escape it. The data-plane and
//! control-plane operations each hold the store's single I/O mutex — the
//! consistency concern here is file metadata, not raw throughput. `copy`
//! composes them and so never holds the mutex across the whole transfer;
//! the naming server drives it under an exclusive lock.

use async_trait::async_trait;
use common::{Command, DfsError, Path, Storage, StorageStub};
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

/// Transfer unit for replica installation.
const COPY_CHUNK: u64 = 1 << 20;

pub struct LocalStore {
    root: PathBuf,
    io_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        LocalStore { root, io_lock: Mutex::new(()) }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn local(&self, path: &Path) -> PathBuf {
        path.to_local(&self.root)
    }

    /// Byte length of an existing regular file, `FileNotFound` otherwise.
    async fn file_len(&self, path: &Path) -> Result<u64, DfsError> {
        let metadata = fs::metadata(self.local(path))
            .await
            .map_err(|_| DfsError::not_found(path))?;
        if metadata.is_dir() {
            return Err(DfsError::not_found(path));
        }
        Ok(metadata.len())
    }
}

#[async_trait]
impl Storage for LocalStore {
    async fn size(&self, path: &Path) -> Result<u64, DfsError> {
        let _io = self.io_lock.lock().await;
        self.file_len(path).await
    }

    async fn read(&self, path: &Path, offset: u64, length: u32) -> Result<Vec<u8>, DfsError> {
        let _io = self.io_lock.lock().await;
        let total = self.file_len(path).await?;

        let end = offset
            .checked_add(length as u64)
            .ok_or_else(|| DfsError::OutOfBounds(format!("read range overflows at {offset}")))?;
        if end > total {
            return Err(DfsError::OutOfBounds(format!(
                "read of {length} bytes at {offset} past end of {path} ({total} bytes)"
            )));
        }

        let mut file = fs::File::open(self.local(path)).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut data = vec![0u8; length as usize];
        file.read_exact(&mut data).await?;
        Ok(data)
    }

    async fn write(&self, path: &Path, offset: u64, data: Vec<u8>) -> Result<(), DfsError> {
        let _io = self.io_lock.lock().await;
        self.file_len(path).await?;

        // Seeking past EOF and writing extends the file with zeros.
        let mut file = fs::OpenOptions::new().write(true).open(self.local(path)).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Command for LocalStore {
    async fn create(&self, path: &Path) -> Result<bool, DfsError> {
        let _io = self.io_lock.lock().await;
        if path.is_root() {
            return Ok(false);
        }

        let local = self.local(path);
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::OpenOptions::new().write(true).create_new(true).open(&local).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, path: &Path) -> Result<bool, DfsError> {
        let _io = self.io_lock.lock().await;
        if path.is_root() {
            return Ok(false);
        }

        let local = self.local(path);
        let metadata = match fs::metadata(&local).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if metadata.is_dir() {
            fs::remove_dir_all(&local).await?;
        } else {
            fs::remove_file(&local).await?;
        }
        Ok(true)
    }

    #[tracing::instrument(level = "debug", skip(self, source), fields(source = %source.addr()))]
    async fn copy(&self, path: &Path, source: &StorageStub) -> Result<bool, DfsError> {
        let total = source.size(path).await?;

        // Replace any stale local copy before streaming the new contents.
        self.delete(path).await?;
        if !self.create(path).await? {
            return Ok(false);
        }

        let mut offset = 0u64;
        while offset < total {
            let length = (total - offset).min(COPY_CHUNK) as u32;
            let data = source.read(path, offset, length).await?;
            self.write(path, offset, data).await?;
            offset += length as u64;
        }
        Ok(true)
    }
}

/// Lists the relative path of every regular file under `root`.
pub fn enumerate(root: &std::path::Path) -> io::Result<Vec<Path>> {
    let mut files = Vec::new();
    walk(root, &Path::root(), &mut files)?;
    Ok(files)
}

fn walk(dir: &std::path::Path, prefix: &Path, out: &mut Vec<Path>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                warn!(dir = %dir.display(), "skipping non-unicode entry {name:?}");
                continue;
            }
        };
        let child = match prefix.join(&name) {
            Ok(child) => child,
            Err(err) => {
                warn!(dir = %dir.display(), "skipping unservable entry: {err}");
                continue;
            }
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), &child, out)?;
        } else if file_type.is_file() {
            out.push(child);
        }
    }
    Ok(())
}

/// Removes directories left empty under `root`, bottom-up. The root itself
/// is kept.
pub fn prune_empty_dirs(root: &std::path::Path) -> io::Result<()> {
    prune(root)?;
    Ok(())
}

fn prune(dir: &std::path::Path) -> io::Result<bool> {
    let mut empty = true;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if prune(&entry.path())? {
                std::fs::remove_dir(entry.path())?;
            } else {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    Ok(empty)
}
