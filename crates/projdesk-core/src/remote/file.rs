//! Local-file document backend.
//!
//! The document lives at `path`; writers serialize on an advisory lock at
//! `path` + `.lock`, compare revisions under the lock, write a sibling temp
//! file, and rename it into place. Readers never lock: a rename is atomic, so
//! they see either the old or the new document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::{DocumentClient, Expected, Revision, Snapshot, WriteCheck, check_revision};
use crate::error::StorageError;
use crate::lock::{DocumentLock, LockError};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct FileDocumentClient {
    path: PathBuf,
    lock_timeout: Duration,
}

impl FileDocumentClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    fn read_current(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&self.path, &err)),
        }
    }

    fn write_atomically(&self, content: &str) -> Result<(), StorageError> {
        let tmp = sibling(&self.path, "tmp");
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        write().map_err(|err| {
            let _ = fs::remove_file(&tmp);
            io_error(&self.path, &err)
        })
    }
}

impl DocumentClient for FileDocumentClient {
    fn fetch(&self) -> Result<Option<Snapshot>, StorageError> {
        let content = self.read_current()?;
        debug!(path = %self.path.display(), present = content.is_some(), "read document file");
        Ok(content.map(Snapshot::new))
    }

    fn store(&self, content: &str, expected: Expected<'_>) -> Result<Revision, StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| io_error(parent, &err))?;
        }

        let _guard = DocumentLock::acquire(&self.lock_path(), self.lock_timeout).map_err(
            |err| match err {
                LockError::Timeout { .. } => StorageError::Network(err.to_string()),
                LockError::Io(io) => io_error(&self.lock_path(), &io),
            },
        )?;

        let current = self.read_current()?;
        let revision = Revision::of(content);
        if check_revision(expected, current.as_deref(), content)? == WriteCheck::AlreadyStored {
            debug!(path = %self.path.display(), %revision, "document file already current");
            return Ok(revision);
        }
        self.write_atomically(content)?;

        debug!(path = %self.path.display(), %revision, "wrote document file");
        Ok(revision)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

fn io_error(path: &Path, err: &io::Error) -> StorageError {
    let detail = format!("{}: {err}", path.display());
    if err.kind() == io::ErrorKind::PermissionDenied {
        StorageError::Auth(detail)
    } else {
        StorageError::Network(detail)
    }
}
