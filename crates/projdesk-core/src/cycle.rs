//! Read-modify-write cycles against the remote document.

use tracing::{debug, warn};

use crate::error::{DeskError, DeskResult, StorageError};
use crate::model::Document;
use crate::remote::{DocumentClient, Expected, Revision};

/// Mutating operations retry the whole cycle this many times on a revision
/// conflict before giving up.
pub const DEFAULT_MAX_CYCLES: u32 = 3;

/// Result of one mutation closure.
pub enum Outcome<T> {
    /// The document changed and must be written.
    Commit(T),
    /// Nothing to write.
    Unchanged(T),
}

/// Fetch and decode the document. A missing document is an empty one, read
/// with no revision; writing it back then requires it to still be absent.
pub fn load(remote: &dyn DocumentClient) -> DeskResult<(Document, Option<Revision>)> {
    match remote.fetch()? {
        Some(snapshot) => {
            let doc = Document::parse(&snapshot.content)?;
            Ok((doc, Some(snapshot.revision)))
        }
        None => {
            debug!(remote = %remote.describe(), "no document yet, starting empty");
            Ok((Document::default(), None))
        }
    }
}

/// Run `mutate` on a freshly loaded document and write it back, retrying
/// from scratch when another writer got there first.
///
/// `mutate` may run more than once and must not have side effects outside
/// the document it is given.
pub fn read_modify_write<T>(
    remote: &dyn DocumentClient,
    max_cycles: u32,
    op: &str,
    mut mutate: impl FnMut(&mut Document) -> DeskResult<Outcome<T>>,
) -> DeskResult<T> {
    let max_cycles = max_cycles.max(1);
    let mut cycle = 1;
    loop {
        let (mut doc, revision) = load(remote)?;
        let value = match mutate(&mut doc)? {
            Outcome::Unchanged(value) => return Ok(value),
            Outcome::Commit(value) => value,
        };

        let content = doc.to_json()?;
        match remote.store(&content, Expected::from_read(revision.as_ref())) {
            Ok(stored) => {
                debug!(op, revision = %stored, cycle, "document written");
                return Ok(value);
            }
            Err(StorageError::Conflict { expected, found }) if cycle < max_cycles => {
                warn!(op, cycle, max_cycles, %expected, %found, "document changed underneath, rerunning");
                cycle += 1;
            }
            Err(StorageError::Conflict { .. }) => {
                return Err(DeskError::Conflict(format!(
                    "{op}: document kept changing after {max_cycles} attempts"
                )));
            }
            Err(err) => return Err(err.into()),
        }
    }
}
