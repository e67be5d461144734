// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! An owner-tagged registry of open file descriptors, so a running daemon
//! can answer "what do I currently have open, and who for" without relying
//! on every call site to keep its own bookkeeping straight.
//!
//! Every descriptor handed out through a [`FdTracker`] is wrapped in a
//! [`TrackedHandle`], which deregisters itself from the tracker and drops
//! (closing) the underlying resource exactly once, whether that happens
//! because the caller called [`TrackedHandle::close`] explicitly or because
//! the handle simply went out of scope.

use std::collections::BTreeMap;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FdError {
    #[error("failed to allocate pty: {0}")]
    Pty(#[from] nix::Error),
}

/// A single tracked entry, as returned by [`FdTracker::debug`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdEntry {
    pub id: u64,
    pub owner: String,
    pub label: String,
}

#[derive(Default)]
struct TrackerInner {
    entries: BTreeMap<u64, FdEntry>,
    next_id: u64,
}

/// Owner-tagged registry of open descriptors.
///
/// Cloning an `FdTracker` shares the same underlying registry (it's an
/// `Arc` internally), the way a single tracker instance is shared across
/// every service in the supervisor.
#[derive(Clone, Default)]
pub struct FdTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl FdTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-open resource under `owner`/`label` and return a
    /// handle that closes it (and deregisters it) on drop.
    pub fn track<T>(&self, owner: impl Into<String>, label: impl Into<String>, resource: T) -> TrackedHandle<T> {
        let owner = owner.into();
        let label = label.into();
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.insert(
                id,
                FdEntry {
                    id,
                    owner: owner.clone(),
                    label: label.clone(),
                },
            );
            id
        };
        tracing::debug!(id, owner = %owner, label = %label, "fd tracker: opened");
        TrackedHandle {
            id,
            owner,
            label,
            tracker: Arc::clone(&self.inner),
            resource: Some(resource),
        }
    }

    /// Allocate a PTY pair and return tracked master/slave file handles.
    ///
    /// Uses `nix`'s safe [`openpty`](nix::pty::openpty) wrapper, which hands
    /// back owned descriptors with no `unsafe` needed on this side.
    pub fn openpty(
        &self,
        owner: impl Into<String>,
    ) -> Result<(TrackedHandle<File>, TrackedHandle<File>), FdError> {
        let owner = owner.into();
        let pty = nix::pty::openpty(None, None)?;
        let master: OwnedFd = pty.master;
        let slave: OwnedFd = pty.slave;
        let master_handle = self.track(owner.clone(), "pty-master", File::from(master));
        let slave_handle = self.track(owner, "pty-slave", File::from(slave));
        Ok((master_handle, slave_handle))
    }

    /// Snapshot of everything currently tracked, for the `debug` RPC-style
    /// introspection the original supervisor exposed.
    pub fn debug(&self) -> Vec<FdEntry> {
        self.inner.lock().entries.values().cloned().collect()
    }

    fn untrack(&self, id: u64) {
        self.inner.lock().entries.remove(&id);
    }
}

/// A tracked resource. Closes the underlying resource and removes its
/// registry entry exactly once, on drop (or on an explicit [`close`](Self::close)).
pub struct TrackedHandle<T> {
    id: u64,
    owner: String,
    label: String,
    tracker: Arc<Mutex<TrackerInner>>,
    resource: Option<T>,
}

impl<T> TrackedHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn get(&self) -> &T {
        self.resource.as_ref().expect("handle used after close")
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.resource.as_mut().expect("handle used after close")
    }

    /// Close the resource and deregister it now, instead of waiting for drop.
    pub fn close(mut self) {
        self.close_inner();
    }

    /// Detach the resource from tracking and hand back plain ownership,
    /// without closing it.
    ///
    /// For when a resource is about to be wrapped by something else (e.g.
    /// a `std::fs::File` being handed to `tokio::fs::File::from_std`) and
    /// the caller will re-track the wrapped value itself rather than
    /// leave this entry pointing at a resource it no longer owns.
    pub fn into_inner(mut self) -> T {
        self.tracker.lock().entries.remove(&self.id);
        self.resource.take().expect("handle used after close")
    }

    fn close_inner(&mut self) {
        if let Some(resource) = self.resource.take() {
            drop(resource);
            self.tracker.lock().entries.remove(&self.id);
            tracing::debug!(id = self.id, owner = %self.owner, label = %self.label, "fd tracker: closed");
        }
    }
}

impl<T> Drop for TrackedHandle<T> {
    fn drop(&mut self) {
        self.close_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_registers_and_drop_deregisters() {
        let tracker = FdTracker::new();
        let handle = tracker.track("svcA", "stdout", 42u32);
        assert_eq!(tracker.debug().len(), 1);
        assert_eq!(tracker.debug()[0].owner, "svcA");
        drop(handle);
        assert_eq!(tracker.debug().len(), 0);
    }

    #[test]
    fn explicit_close_deregisters_immediately() {
        let tracker = FdTracker::new();
        let handle = tracker.track("svcA", "stdin", 1u32);
        assert_eq!(tracker.debug().len(), 1);
        handle.close();
        assert_eq!(tracker.debug().len(), 0);
    }

    #[test]
    fn multiple_handles_get_distinct_ids() {
        let tracker = FdTracker::new();
        let a = tracker.track("svcA", "stdout", 1u32);
        let b = tracker.track("svcB", "stdout", 2u32);
        assert_ne!(a.id(), b.id());
        assert_eq!(tracker.debug().len(), 2);
    }

    #[test]
    fn openpty_returns_two_distinct_tracked_files() {
        let tracker = FdTracker::new();
        let (master, slave) = tracker.openpty("svcA").expect("openpty");
        assert_ne!(master.id(), slave.id());
        assert_eq!(tracker.debug().len(), 2);
    }

    #[test]
    fn untrack_is_idempotent_across_close_then_drop() {
        let tracker = FdTracker::new();
        let handle = tracker.track("svcA", "stdout", 1u32);
        let id = handle.id();
        handle.close();
        // dropping the (already-consumed) id a second time is a no-op
        tracker.untrack(id);
        assert_eq!(tracker.debug().len(), 0);
    }
}
