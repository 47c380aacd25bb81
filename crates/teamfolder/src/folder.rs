//! Team folder handles.
//!
//! A [`FolderHandle`] is the only way the rest of the crate touches a shared
//! team folder. It exposes just what the coordinator needs: enumerate direct
//! entries, create a direct subdirectory, and read, write, rename or remove a
//! file inside one. Exclusive creation and file age back the roster lock.
//! Every call is an await point.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// The kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A regular file (or anything that is not a directory).
    File,
    /// A subdirectory.
    Directory,
}

/// A direct entry of a team folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderEntry {
    /// Entry name.
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
}

impl FolderEntry {
    /// Whether this entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Access to a user-selected team folder.
///
/// `dir` arguments name a direct subdirectory of the folder and `file`
/// arguments name a file inside it; neither may contain path separators.
#[async_trait]
pub trait FolderHandle: Send + Sync + std::fmt::Debug {
    /// Display name of the folder (its last path component).
    fn name(&self) -> &str;

    /// Root path, used for messages and error context.
    fn root(&self) -> &Path;

    /// Check that the folder is still reachable and readable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FolderUnavailable`] or [`Error::PermissionDenied`]
    /// when the handle is no longer usable.
    async fn probe(&self) -> Result<()>;

    /// List every direct entry of the folder.
    ///
    /// # Errors
    ///
    /// Fails if the folder cannot be enumerated.
    async fn entries(&self) -> Result<Vec<FolderEntry>>;

    /// List every entry of a direct subdirectory; empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the subdirectory exists but cannot be enumerated.
    async fn dir_entries(&self, dir: &str) -> Result<Vec<FolderEntry>>;

    /// Create a direct subdirectory if absent. Returns `true` if it was created.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    async fn create_dir(&self, dir: &str) -> Result<bool>;

    /// Read a file, returning `None` if it (or its directory) does not exist.
    ///
    /// # Errors
    ///
    /// Fails on any other I/O error.
    async fn read_file(&self, dir: &str, file: &str) -> Result<Option<Vec<u8>>>;

    /// Create or truncate a file and write `contents`, flushed to disk.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    async fn write_file(&self, dir: &str, file: &str, contents: &[u8]) -> Result<()>;

    /// Create a file only if nothing exists under that name, and write
    /// `contents` flushed to disk. Returns `false` if the file already exists.
    ///
    /// # Errors
    ///
    /// Fails on any I/O error other than already-exists.
    async fn create_new_file(&self, dir: &str, file: &str, contents: &[u8]) -> Result<bool>;

    /// Time since a file was last modified; `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the file metadata cannot be read.
    async fn file_age(&self, dir: &str, file: &str) -> Result<Option<Duration>>;

    /// Rename a file within one directory, replacing the target.
    ///
    /// # Errors
    ///
    /// Fails if the rename fails.
    async fn rename_file(&self, dir: &str, from: &str, to: &str) -> Result<()>;

    /// Remove a file; missing files are ignored.
    ///
    /// # Errors
    ///
    /// Fails on any I/O error other than not-found.
    async fn remove_file(&self, dir: &str, file: &str) -> Result<()>;
}

/// A team folder on the local (possibly synced or network-mounted) filesystem.
#[derive(Debug, Clone)]
pub struct LocalFolder {
    root: PathBuf,
    name: String,
}

impl LocalFolder {
    /// Open a handle to an existing directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FolderUnavailable`] if the path is not a directory, or
    /// [`Error::PermissionDenied`] if it cannot be inspected.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let name = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());

        let metadata = tokio::fs::metadata(&root).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::folder_unavailable(&name, "directory does not exist"),
            _ => Error::folder_io(&root, e),
        })?;
        if !metadata.is_dir() {
            return Err(Error::folder_unavailable(&name, "not a directory"));
        }

        debug!("Opened team folder {}", root.display());
        Ok(Self { root, name })
    }

    fn dir_path(&self, dir: &str) -> PathBuf {
        self.root.join(dir)
    }

    fn file_path(&self, dir: &str, file: &str) -> PathBuf {
        self.root.join(dir).join(file)
    }

    async fn list(path: &Path) -> Result<Vec<FolderEntry>> {
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(|e| Error::folder_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| Error::folder_io(path, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::folder_io(entry.path(), e))?;
            entries.push(FolderEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if file_type.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[async_trait]
impl FolderHandle for LocalFolder {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn probe(&self) -> Result<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(Error::folder_unavailable(&self.name, "not a directory")),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::folder_unavailable(&self.name, "directory was removed"));
            }
            Err(e) => return Err(Error::folder_io(&self.root, e)),
        }

        let _listing = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::folder_io(&self.root, e))?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<FolderEntry>> {
        let entries = Self::list(&self.root).await?;
        trace!("{} has {} entries", self.root.display(), entries.len());
        Ok(entries)
    }

    async fn dir_entries(&self, dir: &str) -> Result<Vec<FolderEntry>> {
        let path = self.dir_path(dir);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => Self::list(&path).await,
            Ok(_) => Ok(Vec::new()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::folder_io(&path, e)),
        }
    }

    async fn create_dir(&self, dir: &str) -> Result<bool> {
        let path = self.dir_path(dir);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => {
                debug!("Created {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let is_dir = tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    Ok(false)
                } else {
                    Err(Error::folder_io(path, e))
                }
            }
            Err(e) => Err(Error::folder_io(path, e)),
        }
    }

    async fn read_file(&self, dir: &str, file: &str) -> Result<Option<Vec<u8>>> {
        let path = self.file_path(dir, file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::folder_io(path, e)),
        }
    }

    async fn write_file(&self, dir: &str, file: &str, contents: &[u8]) -> Result<()> {
        let path = self.file_path(dir, file);
        let mut handle = tokio::fs::File::create(&path)
            .await
            .map_err(|e| Error::folder_io(&path, e))?;
        handle
            .write_all(contents)
            .await
            .map_err(|e| Error::folder_io(&path, e))?;
        handle
            .sync_all()
            .await
            .map_err(|e| Error::folder_io(&path, e))?;
        trace!("Wrote {} bytes to {}", contents.len(), path.display());
        Ok(())
    }

    async fn create_new_file(&self, dir: &str, file: &str, contents: &[u8]) -> Result<bool> {
        let path = self.file_path(dir, file);
        let mut handle = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(handle) => handle,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(Error::folder_io(path, e)),
        };
        handle
            .write_all(contents)
            .await
            .map_err(|e| Error::folder_io(&path, e))?;
        handle
            .sync_all()
            .await
            .map_err(|e| Error::folder_io(&path, e))?;
        trace!("Created {}", path.display());
        Ok(true)
    }

    async fn file_age(&self, dir: &str, file: &str) -> Result<Option<Duration>> {
        let path = self.file_path(dir, file);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::folder_io(path, e)),
        };
        let modified = metadata
            .modified()
            .map_err(|e| Error::folder_io(&path, e))?;
        // A clock skewed into the future on another client reads as brand new.
        Ok(Some(modified.elapsed().unwrap_or_default()))
    }

    async fn rename_file(&self, dir: &str, from: &str, to: &str) -> Result<()> {
        let from_path = self.file_path(dir, from);
        let to_path = self.file_path(dir, to);
        tokio::fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| Error::folder_io(&to_path, e))
    }

    async fn remove_file(&self, dir: &str, file: &str) -> Result<()> {
        let path = self.file_path(dir, file);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::folder_io(path, e)),
        }
    }
}
