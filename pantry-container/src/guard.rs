//! Recursion guard — detects re-entrant resolution of the same key.
//!
//! Each thread keeps the path of keys it is currently resolving.
//! Entering a key already on the path means a factory reached its own
//! key again, directly or transitively.
//!
//! The store-level sentinel ([`Slot::Resolving`](crate::entry::Slot))
//! catches re-entry into memoized factories; this path catches it for
//! protected factories too and supplies the chain for error reports.
//!
//! A thread that blocks on another thread's sentinel records the key
//! it waits for. The resolver follows those records before blocking,
//! so a cycle split across threads fails instead of waiting forever.

use std::thread::{self, ThreadId};

use dashmap::DashMap;
use tracing::warn;

use crate::error::{ContainerError, RecursionLoopError, Result};
use crate::key::ServiceKey;

#[derive(Debug, Default)]
pub(crate) struct RecursionGuard {
    /// Current resolution path per thread.
    paths: DashMap<ThreadId, Vec<ServiceKey>>,
    /// Key each blocked thread is waiting for.
    waiting: DashMap<ThreadId, ServiceKey>,
}

impl RecursionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `key` on the calling thread's path.
    ///
    /// # Errors
    /// [`ContainerError::RecursionInfiniteLoop`] if `key` is already on it.
    pub fn enter(&self, key: &ServiceKey) -> Result<PathTicket<'_>> {
        let thread = thread::current().id();
        let mut path = self.paths.entry(thread).or_default();

        if path.contains(key) {
            let chain = Self::chain_from(&path, key);
            drop(path);
            return Err(Self::report(chain));
        }

        path.push(key.clone());
        Ok(PathTicket { guard: self, thread })
    }

    /// Builds the error for re-entering `key` on the calling thread.
    pub fn cycle(&self, key: &ServiceKey) -> ContainerError {
        let thread = thread::current().id();
        let chain = match self.paths.get(&thread) {
            Some(path) => Self::chain_from(&path, key),
            None => vec![key.clone(), key.clone()],
        };
        Self::report(chain)
    }

    /// Records that the calling thread blocks until `key` settles.
    pub fn wait_on(&self, key: &ServiceKey) -> WaitTicket<'_> {
        let thread = thread::current().id();
        self.waiting.insert(thread, key.clone());
        WaitTicket { guard: self, thread }
    }

    /// The key `thread` is blocked on, if any.
    pub fn waiting_on(&self, thread: ThreadId) -> Option<ServiceKey> {
        self.waiting.get(&thread).map(|key| key.clone())
    }

    /// Builds the error for a cycle that spans threads.
    ///
    /// `links` starts with the key the calling thread asked for and
    /// follows the keys the other threads wait on; its last key is one
    /// the calling thread is building.
    pub fn cross_thread_cycle(&self, links: Vec<ServiceKey>) -> ContainerError {
        let thread = thread::current().id();
        let mut chain = match (self.paths.get(&thread), links.last()) {
            (Some(path), Some(last)) => {
                let start = path.iter().position(|k| k == last).unwrap_or(0);
                path[start..].to_vec()
            }
            _ => Vec::new(),
        };
        chain.extend(links);
        Self::report(chain)
    }

    /// Depth of the calling thread's resolution path.
    pub fn depth(&self) -> usize {
        self.paths
            .get(&thread::current().id())
            .map_or(0, |path| path.len())
    }

    fn chain_from(path: &[ServiceKey], key: &ServiceKey) -> Vec<ServiceKey> {
        let start = path.iter().position(|k| k == key).unwrap_or(path.len());
        let mut chain: Vec<ServiceKey> = path[start..].to_vec();
        if chain.is_empty() {
            chain.push(key.clone());
        }
        chain.push(key.clone());
        chain
    }

    fn report(chain: Vec<ServiceKey>) -> ContainerError {
        warn!(cycle = ?chain, "Infinite resolution recursion detected!");
        ContainerError::RecursionInfiniteLoop(RecursionLoopError { chain })
    }

    fn leave(&self, thread: ThreadId) {
        let now_empty = match self.paths.get_mut(&thread) {
            Some(mut path) => {
                path.pop();
                path.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.paths.remove_if(&thread, |_, path| path.is_empty());
        }
    }
}

/// Pops its key off the thread's path when dropped, including on
/// error returns and panics inside factories.
#[must_use]
pub(crate) struct PathTicket<'a> {
    guard: &'a RecursionGuard,
    thread: ThreadId,
}

impl Drop for PathTicket<'_> {
    fn drop(&mut self) {
        self.guard.leave(self.thread);
    }
}

/// Clears the calling thread's wait record when dropped.
#[must_use]
pub(crate) struct WaitTicket<'a> {
    guard: &'a RecursionGuard,
    thread: ThreadId,
}

impl Drop for WaitTicket<'_> {
    fn drop(&mut self) {
        self.guard.waiting.remove(&self.thread);
    }
}
