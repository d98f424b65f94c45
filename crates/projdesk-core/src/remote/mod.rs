//! Remote document clients.
//!
//! A [`DocumentClient`] moves one opaque JSON blob to and from a versioned
//! endpoint. It holds no domain state. Writes replace the whole blob; the
//! endpoint either accepts all of it or none of it.
//!
//! # Revisions
//!
//! Every fetched snapshot carries a [`Revision`] (BLAKE3 of the content).
//! Passing it back as [`Expected::Revision`] on [`DocumentClient::store`] asks
//! the backend to refuse the write with [`StorageError::Conflict`] if the
//! stored content moved on in between; [`Expected::Absent`] does the same for
//! a document that did not exist when it was read. Callers then rerun their
//! read-modify-write cycle.
//!
//! A store whose content is already in place succeeds without writing. A
//! retried write whose first attempt landed but lost its reply therefore
//! reports success instead of a conflict with itself.
//!
//! # Backends
//!
//! - [`gist::GistClient`]: GitHub Gist over HTTPS
//! - [`file::FileDocumentClient`]: local file under an advisory lock
//! - [`memory::MemoryDocumentClient`]: in-process, with fault injection

pub mod file;
pub mod gist;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

use crate::error::StorageError;

/// Content hash identifying one version of the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision(String);

impl Revision {
    /// Revision of the given document content.
    #[must_use]
    pub fn of(content: &str) -> Self {
        Self(format!("blake3:{}", blake3::hash(content.as_bytes()).to_hex()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw document content together with its revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub content: String,
    pub revision: Revision,
}

impl Snapshot {
    #[must_use]
    pub fn new(content: String) -> Self {
        let revision = Revision::of(&content);
        Self { content, revision }
    }
}

/// Precondition on the stored document for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected<'a> {
    /// Write whatever is stored.
    Any,
    /// The document must not exist yet.
    Absent,
    /// The stored content must still have this revision.
    Revision(&'a Revision),
}

impl<'a> Expected<'a> {
    /// Precondition matching what a read returned.
    #[must_use]
    pub fn from_read(revision: Option<&'a Revision>) -> Self {
        revision.map_or(Self::Absent, Self::Revision)
    }
}

impl fmt::Display for Expected<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Absent => f.write_str("absent"),
            Self::Revision(rev) => fmt::Display::fmt(rev, f),
        }
    }
}

/// Reads and writes the single remote JSON document.
pub trait DocumentClient: Send + Sync {
    /// Fetch the current document, or `None` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the endpoint cannot be read.
    fn fetch(&self) -> Result<Option<Snapshot>, StorageError>;

    /// Replace the whole document.
    ///
    /// The write is refused with [`StorageError::Conflict`] unless the stored
    /// document satisfies `expected`, or already holds exactly `content`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the write is rejected or fails.
    fn store(&self, content: &str, expected: Expected<'_>) -> Result<Revision, StorageError>;

    /// Short description for logs (never includes credentials).
    fn describe(&self) -> String;
}

impl<T: DocumentClient + ?Sized> DocumentClient for Arc<T> {
    fn fetch(&self) -> Result<Option<Snapshot>, StorageError> {
        (**self).fetch()
    }

    fn store(&self, content: &str, expected: Expected<'_>) -> Result<Revision, StorageError> {
        (**self).store(content, expected)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: DocumentClient + ?Sized> DocumentClient for Box<T> {
    fn fetch(&self) -> Result<Option<Snapshot>, StorageError> {
        (**self).fetch()
    }

    fn store(&self, content: &str, expected: Expected<'_>) -> Result<Revision, StorageError> {
        (**self).store(content, expected)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// What a backend should do after checking a write's precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteCheck {
    Apply,
    AlreadyStored,
}

/// Check a write's precondition against what is stored right now.
pub(crate) fn check_revision(
    expected: Expected<'_>,
    current: Option<&str>,
    content: &str,
) -> Result<WriteCheck, StorageError> {
    if current == Some(content) {
        return Ok(WriteCheck::AlreadyStored);
    }
    let found = current.map(Revision::of);
    let holds = match expected {
        Expected::Any => true,
        Expected::Absent => found.is_none(),
        Expected::Revision(rev) => found.as_ref() == Some(rev),
    };
    if holds {
        Ok(WriteCheck::Apply)
    } else {
        Err(StorageError::Conflict {
            expected: expected.to_string(),
            found: found.map_or_else(|| "absent".to_string(), |rev| rev.to_string()),
        })
    }
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy with no sleeping between attempts.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1_u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op`, retrying transient errors until the attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the first permanent error, or the last transient one.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(what, attempt, max_attempts, ?delay, error = %err, "transient remote failure, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Decorator adding [`RetryPolicy`] to any backend.
#[derive(Debug)]
pub struct Retrying<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: DocumentClient> Retrying<C> {
    pub const fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<C: DocumentClient> DocumentClient for Retrying<C> {
    fn fetch(&self) -> Result<Option<Snapshot>, StorageError> {
        self.policy.run("fetch", || self.inner.fetch())
    }

    fn store(&self, content: &str, expected: Expected<'_>) -> Result<Revision, StorageError> {
        self.policy
            .run("store", || self.inner.store(content, expected))
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn revision_is_content_addressed() {
        let a = Revision::of("{\"projects\":[]}");
        let b = Revision::of("{\"projects\":[]}");
        let c = Revision::of("{\"projects\":[1]}");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("blake3:"));
    }

    #[test]
    fn check_revision_semantics() {
        let rev = Revision::of("x");
        assert_eq!(check_revision(Expected::Any, None, "z"), Ok(WriteCheck::Apply));
        assert_eq!(check_revision(Expected::Any, Some("y"), "z"), Ok(WriteCheck::Apply));
        assert_eq!(
            check_revision(Expected::Revision(&rev), Some("x"), "z"),
            Ok(WriteCheck::Apply)
        );
        assert!(matches!(
            check_revision(Expected::Revision(&rev), Some("y"), "z"),
            Err(StorageError::Conflict { .. })
        ));
        assert!(matches!(
            check_revision(Expected::Revision(&rev), None, "z"),
            Err(StorageError::Conflict { found, .. }) if found == "absent"
        ));
    }

    #[test]
    fn absent_precondition_refuses_an_existing_document() {
        assert_eq!(check_revision(Expected::Absent, None, "z"), Ok(WriteCheck::Apply));
        assert!(matches!(
            check_revision(Expected::Absent, Some("y"), "z"),
            Err(StorageError::Conflict { expected, .. }) if expected == "absent"
        ));
    }

    #[test]
    fn content_already_in_place_is_not_a_conflict() {
        let stale = Revision::of("x");
        assert_eq!(
            check_revision(Expected::Revision(&stale), Some("z"), "z"),
            Ok(WriteCheck::AlreadyStored)
        );
        assert_eq!(
            check_revision(Expected::Absent, Some("z"), "z"),
            Ok(WriteCheck::AlreadyStored)
        );
    }

    #[test]
    fn expected_from_read() {
        let rev = Revision::of("x");
        assert_eq!(Expected::from_read(None), Expected::Absent);
        assert_eq!(Expected::from_read(Some(&rev)), Expected::Revision(&rev));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
        assert_eq!(policy.delay_after(3), Duration::from_millis(800));
        assert_eq!(policy.delay_after(10), Duration::from_secs(2));
    }

    #[test]
    fn transient_errors_are_retried_within_budget() {
        let calls = Cell::new(0);
        let result = RetryPolicy::immediate(3).run("fetch", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(StorageError::Network("reset".into()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn transient_errors_surface_after_budget() {
        let calls = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::immediate(3).run("fetch", || {
            calls.set(calls.get() + 1);
            Err(StorageError::Network("timeout".into()))
        });
        assert_eq!(result, Err(StorageError::Network("timeout".into())));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::immediate(3).run("store", || {
            calls.set(calls.get() + 1);
            Err(StorageError::Auth("401".into()))
        });
        assert!(matches!(result, Err(StorageError::Auth(_))));
        assert_eq!(calls.get(), 1);
    }
}
