use std::sync::Arc;

use log::{debug, info};

use crate::{
    cache::WorkingTreeCache,
    model::{Identifier, RepositoryProvenance, VcsInfo},
};

use super::{tags::TagGuesser, ResolutionError};

/// Resolves repository locators to canonical revisions using working trees leased from
/// a shared [`WorkingTreeCache`].
pub struct RevisionResolver {
    cache: Arc<WorkingTreeCache>,
    tag_guesser: TagGuesser,
}

impl RevisionResolver {
    pub fn new(cache: Arc<WorkingTreeCache>) -> Self {
        RevisionResolver {
            cache,
            tag_guesser: TagGuesser::default(),
        }
    }

    pub fn with_tag_guesser(mut self, tag_guesser: TagGuesser) -> Self {
        self.tag_guesser = tag_guesser;
        self
    }

    pub fn cache(&self) -> &Arc<WorkingTreeCache> {
        &self.cache
    }

    /// Resolves the declared revision of `vcs`, or guesses a tag from the name and
    /// version of `id` if none is declared.
    ///
    /// Also returns whether the revision is fixed. It is not if it named a branch.
    pub fn resolve(
        &self,
        vcs: &VcsInfo,
        id: &Identifier,
    ) -> Result<(RepositoryProvenance, bool), ResolutionError> {
        let unavailable = |error: &dyn std::error::Error| ResolutionError::RepositoryUnavailable {
            url: vcs.url.clone(),
            reason: error.to_string(),
        };

        let mut lease = self
            .cache
            .lease(vcs.vcs_type, &vcs.url)
            .map_err(|error| unavailable(&error))?;
        let working_tree = lease.working_tree();

        let revision = if vcs.revision.is_empty() {
            let tags = working_tree.list_tags().map_err(|error| unavailable(&error))?;
            let tag = self
                .tag_guesser
                .guess(&id.name, &id.version, &tags)
                .ok_or_else(|| ResolutionError::NoMatchingTag {
                    url: vcs.url.clone(),
                    name: id.name.clone(),
                    version: id.version.clone(),
                })?;
            debug!("Guessed tag {} of {} for {}", tag, vcs.url, id);
            working_tree.revision_for_tag(tag)
        } else {
            vcs.revision.clone()
        };

        let resolved = working_tree
            .resolve_revision(&revision)
            .map_err(|error| unavailable(&error))?
            .ok_or_else(|| ResolutionError::RevisionNotFound {
                url: vcs.url.clone(),
                revision: revision.clone(),
            })?;
        lease.release();

        info!(
            "Resolved revision {} of {} to {}",
            revision, vcs.url, resolved.revision
        );

        Ok((
            RepositoryProvenance {
                vcs_info: vcs.clone(),
                resolved_revision: resolved.revision,
            },
            resolved.is_fixed,
        ))
    }
}
