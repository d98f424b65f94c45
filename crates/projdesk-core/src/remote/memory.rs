use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{DocumentClient, Expected, Revision, Snapshot, WriteCheck, check_revision};
use crate::error::StorageError;

type Hook = Box<dyn FnOnce() + Send>;

/// In-process document, used by tests and dry runs.
///
/// Revision checks are exact: they run under the same mutex as the write.
/// Faults queued with [`fail_next`](Self::fail_next) are returned, in order,
/// by the next calls to `fetch` or `store` instead of touching the content.
#[derive(Default)]
pub struct MemoryDocumentClient {
    content: Mutex<Option<String>>,
    faults: Mutex<VecDeque<StorageError>>,
    before_store: Mutex<Option<Hook>>,
    fetches: AtomicUsize,
    stores: AtomicUsize,
}

impl MemoryDocumentClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_content(content: impl Into<String>) -> Self {
        let client = Self::default();
        *lock(&client.content) = Some(content.into());
        client
    }

    /// Current raw content, bypassing faults and counters.
    #[must_use]
    pub fn content(&self) -> Option<String> {
        lock(&self.content).clone()
    }

    /// Queue an error for the next `fetch`/`store` call.
    pub fn fail_next(&self, err: StorageError) {
        lock(&self.faults).push_back(err);
    }

    /// Run `hook` once, right before the next `store` applies its write.
    ///
    /// Used to simulate another writer slipping in between our read and write.
    pub fn before_next_store(&self, hook: impl FnOnce() + Send + 'static) {
        *lock(&self.before_store) = Some(Box::new(hook));
    }

    /// Number of `fetch` calls seen, including failed ones.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of `store` calls seen, including failed ones.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    fn take_fault(&self) -> Option<StorageError> {
        lock(&self.faults).pop_front()
    }
}

impl DocumentClient for MemoryDocumentClient {
    fn fetch(&self) -> Result<Option<Snapshot>, StorageError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_fault() {
            return Err(err);
        }
        Ok(lock(&self.content).clone().map(Snapshot::new))
    }

    fn store(&self, content: &str, expected: Expected<'_>) -> Result<Revision, StorageError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_fault() {
            return Err(err);
        }

        let hook = lock(&self.before_store).take();
        if let Some(hook) = hook {
            hook();
        }

        let mut current = lock(&self.content);
        if check_revision(expected, current.as_deref(), content)? == WriteCheck::Apply {
            *current = Some(content.to_string());
        }
        Ok(Revision::of(content))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
