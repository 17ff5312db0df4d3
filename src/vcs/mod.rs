//! Version control backends.
//!
//! A [`VersionControl`] backend produces a [`WorkingTree`] for a repository URL. Working
//! trees are only ever handed out through the
//! [`WorkingTreeCache`](crate::cache::WorkingTreeCache), which guarantees that a single
//! tree is never used by two callers at once.

mod command;
pub mod git;
pub mod mercurial;
pub mod subversion;
pub mod url;

#[cfg(test)]
pub(crate) mod testing;

use std::{collections::HashMap, path::Path, sync::Arc};

use thiserror::Error;

use crate::model::VcsType;

pub use self::{git::Git, mercurial::Mercurial, subversion::Subversion};

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Command `{command}` failed with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("Repository {url} is not available: {reason}")]
    Unavailable { url: String, reason: String },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// A revision that was found in a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRevision {
    /// Commit hash or numeric revision.
    pub revision: String,
    /// False if the requested revision was a moving reference like a branch.
    pub is_fixed: bool,
}

impl ResolvedRevision {
    pub fn fixed(revision: impl Into<String>) -> Self {
        ResolvedRevision {
            revision: revision.into(),
            is_fixed: true,
        }
    }

    pub fn moving(revision: impl Into<String>) -> Self {
        ResolvedRevision {
            revision: revision.into(),
            is_fixed: false,
        }
    }
}

pub trait VersionControl: Send + Sync {
    fn vcs_type(&self) -> VcsType;

    /// Opens the working tree in `directory`, or creates it from `url` if there is none,
    /// and brings it up to date with the remote.
    fn open_working_tree(
        &self,
        directory: &Path,
        url: &str,
    ) -> Result<Box<dyn WorkingTree>, VcsError>;
}

pub trait WorkingTree: Send {
    fn list_tags(&self) -> Result<Vec<String>, VcsError>;

    /// Resolves a commit-ish, tag, branch or revision number. Returns `None` if the
    /// repository does not contain it.
    fn resolve_revision(&mut self, revision: &str) -> Result<Option<ResolvedRevision>, VcsError>;

    /// The revision string that addresses `tag`, as returned by [`WorkingTree::list_tags`].
    fn revision_for_tag(&self, tag: &str) -> String {
        tag.to_owned()
    }
}

/// Maps each [`VcsType`] to the backend that handles it.
#[derive(Clone, Default)]
pub struct VcsRegistry {
    backends: HashMap<VcsType, Arc<dyn VersionControl>>,
}

impl VcsRegistry {
    pub fn empty() -> Self {
        VcsRegistry::default()
    }

    pub fn with_defaults() -> Self {
        VcsRegistry::empty()
            .register(Arc::new(Git))
            .register(Arc::new(Subversion))
            .register(Arc::new(Mercurial))
    }

    pub fn register(mut self, backend: Arc<dyn VersionControl>) -> Self {
        self.backends.insert(backend.vcs_type(), backend);
        self
    }

    pub fn get(&self, vcs_type: VcsType) -> Option<Arc<dyn VersionControl>> {
        self.backends.get(&vcs_type).cloned()
    }
}
