use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crate::model::VcsType;

use super::{ResolvedRevision, VcsError, VersionControl, WorkingTree};

/// Contents of a repository served by [`FakeVersionControl`].
#[derive(Clone, Default)]
pub(crate) struct FakeRepository {
    pub tags: Vec<String>,
    pub revisions: HashMap<String, ResolvedRevision>,
    pub tag_prefix: String,
}

impl FakeRepository {
    pub fn tag(mut self, tag: &str, commit: &str) -> Self {
        self.tags.push(tag.to_owned());
        self.revisions.insert(
            format!("{}{}", self.tag_prefix, tag),
            ResolvedRevision::fixed(commit),
        );
        self
    }

    pub fn branch(mut self, branch: &str, commit: &str) -> Self {
        self.revisions
            .insert(branch.to_owned(), ResolvedRevision::moving(commit));
        self
    }

    pub fn commit(mut self, commit: &str) -> Self {
        self.revisions
            .insert(commit.to_owned(), ResolvedRevision::fixed(commit));
        self
    }
}

/// In-memory backend that counts how often a working tree was opened, i.e. how many
/// clones or updates a real backend would have performed.
pub(crate) struct FakeVersionControl {
    vcs_type: VcsType,
    repositories: HashMap<String, FakeRepository>,
    opened: Arc<AtomicUsize>,
    delay: Duration,
}

impl FakeVersionControl {
    pub fn new(vcs_type: VcsType) -> Self {
        FakeVersionControl {
            vcs_type,
            repositories: HashMap::new(),
            opened: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    pub fn repository(mut self, url: &str, repository: FakeRepository) -> Self {
        self.repositories.insert(url.to_owned(), repository);
        self
    }

    /// Time a simulated clone takes.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        self.opened.clone()
    }
}

impl VersionControl for FakeVersionControl {
    fn vcs_type(&self) -> VcsType {
        self.vcs_type
    }

    fn open_working_tree(
        &self,
        directory: &Path,
        url: &str,
    ) -> Result<Box<dyn WorkingTree>, VcsError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);

        let repository = self
            .repositories
            .get(url)
            .cloned()
            .ok_or_else(|| VcsError::Unavailable {
                url: url.to_owned(),
                reason: "repository not found".to_owned(),
            })?;
        std::fs::create_dir_all(directory)?;

        Ok(Box::new(FakeWorkingTree { repository }))
    }
}

struct FakeWorkingTree {
    repository: FakeRepository,
}

impl WorkingTree for FakeWorkingTree {
    fn list_tags(&self) -> Result<Vec<String>, VcsError> {
        Ok(self.repository.tags.clone())
    }

    fn resolve_revision(&mut self, revision: &str) -> Result<Option<ResolvedRevision>, VcsError> {
        Ok(self.repository.revisions.get(revision).cloned())
    }

    fn revision_for_tag(&self, tag: &str) -> String {
        format!("{}{}", self.repository.tag_prefix, tag)
    }
}
