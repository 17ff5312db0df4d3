//! Local working trees of remote repositories.
//!
//! The cache owns at most one working tree per VCS type and normalized URL. Leasing a
//! tree gives the caller exclusive access to it until the lease is dropped, so the
//! on-disk state of a repository is never touched by two operations at once. The first
//! lease for a repository clones (or updates) it; concurrent callers for the same
//! repository wait for that lease instead of cloning again, while callers for other
//! repositories proceed in parallel.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
};

use dashmap::DashMap;
use log::{debug, info};
use thiserror::Error;

use crate::{
    flock::FileLock,
    model::VcsType,
    vcs::{
        url::{normalize_url, url_to_path},
        VcsError, VcsRegistry, WorkingTree,
    },
};

const WORKING_TREES_DIR: &str = "working-trees";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired")]
    Lock(#[from] crate::flock::Error),
    #[error("No backend available for VCS type {0}")]
    UnsupportedVcs(VcsType),
    #[error("The working tree cache has been shut down")]
    ShutDown,
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkingTreeKey {
    pub vcs_type: VcsType,
    pub url: String,
}

impl WorkingTreeKey {
    pub fn new(vcs_type: VcsType, url: &str) -> Self {
        WorkingTreeKey {
            vcs_type,
            url: normalize_url(url),
        }
    }
}

enum SlotState {
    /// Nothing has been cloned yet, or the last attempt failed.
    Empty,
    Available(Box<dyn WorkingTree>),
    Leased,
}

struct Slot {
    state: Mutex<SlotState>,
    released: Condvar,
}

impl Slot {
    fn new() -> Self {
        Slot {
            state: Mutex::new(SlotState::Empty),
            released: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SlotState>) -> MutexGuard<'a, SlotState> {
        self.released
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn put(&self, state: SlotState) {
        *self.lock() = state;
        self.released.notify_all();
    }
}

pub struct WorkingTreeCache {
    location: PathBuf,
    registry: VcsRegistry,
    slots: DashMap<WorkingTreeKey, Arc<Slot>>,
    shut_down: AtomicBool,
    _lock: FileLock,
}

impl WorkingTreeCache {
    pub fn new(location: PathBuf, registry: VcsRegistry) -> Result<WorkingTreeCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.display().to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&location)?;
        }

        let lock = Self::acquire_lock(&location)?;

        Ok(WorkingTreeCache {
            location,
            registry,
            slots: DashMap::new(),
            shut_down: AtomicBool::new(false),
            _lock: lock,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Leases the working tree for a repository, cloning it on first use. Blocks while
    /// another caller holds the lease for the same repository.
    pub fn lease(&self, vcs_type: VcsType, url: &str) -> Result<WorkingTreeLease, CacheError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(CacheError::ShutDown);
        }

        let key = WorkingTreeKey::new(vcs_type, url);
        let directory = self.working_tree_path(&key)?;
        let backend = self
            .registry
            .get(vcs_type)
            .ok_or(CacheError::UnsupportedVcs(vcs_type))?;
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone();

        let mut state = slot.lock();
        loop {
            if self.shut_down.load(Ordering::SeqCst) {
                return Err(CacheError::ShutDown);
            }
            match std::mem::replace(&mut *state, SlotState::Leased) {
                SlotState::Available(working_tree) => {
                    debug!("Reusing working tree for {}", key.url);
                    drop(state);
                    return Ok(WorkingTreeLease::new(slot, key, working_tree));
                }
                SlotState::Empty => {
                    // Other callers see the slot as leased and wait for the clone.
                    drop(state);
                    info!(
                        "Preparing {} working tree for {} in {}",
                        key.vcs_type,
                        key.url,
                        directory.display()
                    );
                    return match backend.open_working_tree(&directory, &key.url) {
                        Ok(working_tree) => Ok(WorkingTreeLease::new(slot, key, working_tree)),
                        Err(error) => {
                            slot.put(SlotState::Empty);
                            Err(error.into())
                        }
                    };
                }
                SlotState::Leased => {
                    debug!("Waiting for the working tree of {}", key.url);
                    state = slot.wait(state);
                }
            }
        }
    }

    /// Returns a lease to the cache. Equivalent to dropping it.
    pub fn release(&self, lease: WorkingTreeLease) {
        lease.release()
    }

    /// Waits for all outstanding leases to be returned and drops every cached working
    /// tree. Leasing fails afterwards. Calling this more than once is harmless. The
    /// trees stay on disk and are reused by the next cache opened on this location.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let slots: Vec<Arc<Slot>> = self
            .slots
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for slot in slots {
            let mut state = slot.lock();
            while matches!(*state, SlotState::Leased) {
                state = slot.wait(state);
            }
            *state = SlotState::Empty;
            slot.released.notify_all();
        }
        self.slots.clear();
        debug!("Working tree cache at {} shut down", self.location.display());
    }

    /// Shuts the cache down and deletes all working trees. Other files in the cache
    /// location, like a provenance storage file, are kept.
    pub fn clear(&self) -> anyhow::Result<()> {
        self.shutdown();
        let working_trees = self.location.join(WORKING_TREES_DIR);
        if working_trees.exists() {
            info!("Clearing working tree cache {}.", working_trees.display());
            std::fs::remove_dir_all(&working_trees)?;
        }
        Ok(())
    }

    fn working_tree_path(&self, key: &WorkingTreeKey) -> Result<PathBuf, CacheError> {
        let relative = url_to_path(&key.url).map_err(VcsError::from)?;
        Ok(self
            .location
            .join(WORKING_TREES_DIR)
            .join(key.vcs_type.to_string())
            .join(relative))
    }

    fn acquire_lock(location: &Path) -> Result<FileLock, CacheError> {
        let location = location.join(".lock");
        debug!(
            "Acquiring a lock on the cache location: {}",
            location.display()
        );
        let lock = FileLock::new(&location)?;
        info!("Acquired a lock on the cache location");
        Ok(lock)
    }
}

impl Drop for WorkingTreeCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Exclusive access to a cached working tree. Dropping the lease hands the tree back to
/// the cache; it is never deleted.
pub struct WorkingTreeLease {
    slot: Arc<Slot>,
    key: WorkingTreeKey,
    working_tree: Option<Box<dyn WorkingTree>>,
}

impl WorkingTreeLease {
    fn new(slot: Arc<Slot>, key: WorkingTreeKey, working_tree: Box<dyn WorkingTree>) -> Self {
        WorkingTreeLease {
            slot,
            key,
            working_tree: Some(working_tree),
        }
    }

    pub fn key(&self) -> &WorkingTreeKey {
        &self.key
    }

    pub fn working_tree(&mut self) -> &mut dyn WorkingTree {
        // Only taken in drop.
        match self.working_tree.as_mut() {
            Some(working_tree) => working_tree.as_mut(),
            None => unreachable!("working tree of a live lease"),
        }
    }

    pub fn release(self) {}
}

impl Drop for WorkingTreeLease {
    fn drop(&mut self) {
        if let Some(working_tree) = self.working_tree.take() {
            self.slot.put(SlotState::Available(working_tree));
        }
    }
}
