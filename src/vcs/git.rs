use std::path::Path;

use git2::{
    cert::Cert, AutotagOption, CertificateCheckStatus, Config, Cred, CredentialType, ErrorCode,
    FetchOptions, Oid, RemoteCallbacks, Repository,
};
use log::{debug, info, trace, warn};
use ssh_key::{known_hosts::HostPatterns, KnownHosts};

use crate::model::VcsType;

use super::{ResolvedRevision, VcsError, VersionControl, WorkingTree};

const GLOBAL_KNOWN_HOSTS: &str = "/etc/ssh/ssh_known_hosts";
const REMOTE: &str = "origin";
const BRANCHES_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";
const TAGS_REFSPEC: &str = "+refs/tags/*:refs/tags/*";

/// Git backend on top of libgit2. Working trees are bare repositories, nothing is
/// ever checked out.
pub struct Git;

impl VersionControl for Git {
    fn vcs_type(&self) -> VcsType {
        VcsType::Git
    }

    fn open_working_tree(
        &self,
        directory: &Path,
        url: &str,
    ) -> Result<Box<dyn WorkingTree>, VcsError> {
        let repository = if !directory.exists() {
            init_bare_repository(directory, url)?
        } else {
            open_bare_repository(directory, url).or_else(|error| {
                warn!(
                    "Working tree {} is broken ({}), cloning {} again",
                    directory.display(),
                    error,
                    url
                );
                std::fs::remove_dir_all(directory)?;
                init_bare_repository(directory, url)
            })?
        };

        let working_tree = GitWorkingTree {
            repository,
            url: url.to_owned(),
        };
        working_tree.fetch()?;

        Ok(Box::new(working_tree))
    }
}

/// Opens a bare repository left by an earlier run and points its remote at `url`.
fn open_bare_repository(directory: &Path, url: &str) -> Result<Repository, VcsError> {
    trace!("Opening bare repository {}", directory.display());
    let repository = Repository::open_bare(directory)?;

    let current_url = repository.find_remote(REMOTE)?.url().map(str::to_owned);
    if current_url.as_deref() != Some(url) {
        debug!(
            "Remote of {} moved from {:?} to {}",
            directory.display(),
            current_url,
            url
        );
        repository.remote_set_url(REMOTE, url)?;
    }
    Ok(repository)
}

fn init_bare_repository(directory: &Path, url: &str) -> Result<Repository, VcsError> {
    trace!("Initializing bare repository {}", directory.display());
    let repository = Repository::init_bare(directory)?;
    repository.remote_with_fetch(REMOTE, url, BRANCHES_REFSPEC)?;
    Ok(repository)
}

pub struct GitWorkingTree {
    repository: Repository,
    url: String,
}

impl GitWorkingTree {
    fn fetch(&self) -> Result<(), VcsError> {
        info!("Fetching {}", self.url);
        let mut remote = self.repository.find_remote(REMOTE)?;
        remote
            .fetch(
                &[BRANCHES_REFSPEC, TAGS_REFSPEC],
                Some(&mut fetch_options()),
                None,
            )
            .map_err(|error| VcsError::Unavailable {
                url: self.url.clone(),
                reason: error.message().to_owned(),
            })
    }

    fn fetch_commit(&self, commit_hash: &str) -> Result<(), VcsError> {
        let mut remote = self.repository.find_remote(REMOTE)?;
        remote.fetch(&[commit_hash], Some(&mut fetch_options()), None)?;
        Ok(())
    }

    fn reference_commit(&self, name: &str) -> Result<Option<Oid>, VcsError> {
        match self.repository.find_reference(name) {
            Ok(reference) => Ok(Some(reference.peel_to_commit()?.id())),
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find_commit(&self, commit_ish: &str) -> Result<Option<Oid>, VcsError> {
        match self.repository.revparse_single(commit_ish) {
            Ok(object) => match object.peel_to_commit() {
                Ok(commit) => Ok(Some(commit.id())),
                Err(_) => Ok(None),
            },
            Err(e)
                if matches!(
                    e.code(),
                    ErrorCode::NotFound | ErrorCode::Ambiguous | ErrorCode::InvalidSpec
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl WorkingTree for GitWorkingTree {
    fn list_tags(&self) -> Result<Vec<String>, VcsError> {
        Ok(self
            .repository
            .tag_names(None)?
            .iter()
            .flatten()
            .map(str::to_owned)
            .collect())
    }

    fn resolve_revision(&mut self, revision: &str) -> Result<Option<ResolvedRevision>, VcsError> {
        if let Some(oid) = self.reference_commit(&format!("refs/tags/{revision}"))? {
            return Ok(Some(ResolvedRevision::fixed(oid.to_string())));
        }

        if let Some(oid) = self.reference_commit(&format!("refs/remotes/{REMOTE}/{revision}"))? {
            return Ok(Some(ResolvedRevision::moving(oid.to_string())));
        }

        if !is_commit_hash_like(revision) {
            return Ok(None);
        }

        if let Some(oid) = self.find_commit(revision)? {
            return Ok(Some(ResolvedRevision::fixed(oid.to_string())));
        }

        if revision.len() == 40 {
            // The commit may not be reachable from any branch or tag.
            debug!("Commit {} not found locally, fetching it", revision);
            if let Err(error) = self.fetch_commit(revision) {
                warn!(
                    "Failed to fetch a single commit {} from {}: {}",
                    revision, self.url, error
                );
                return Ok(None);
            }
            return Ok(self
                .find_commit(revision)?
                .map(|oid| ResolvedRevision::fixed(oid.to_string())));
        }

        Ok(None)
    }
}

fn is_commit_hash_like(revision: &str) -> bool {
    (7..=40).contains(&revision.len()) && revision.chars().all(|c| c.is_ascii_hexdigit())
}

fn fetch_options() -> FetchOptions<'static> {
    let git_config = Config::open_default().ok();

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username, allowed| {
        trace!("Credentials requested for {url} (user {username:?}, {allowed:?})");
        let username = username.unwrap_or("git");
        if allowed.contains(CredentialType::USERNAME) {
            Cred::username(username)
        } else if allowed.contains(CredentialType::SSH_KEY) {
            Cred::ssh_key_from_agent(username)
        } else if let (true, Some(git_config)) = (
            allowed.contains(CredentialType::USER_PASS_PLAINTEXT),
            &git_config,
        ) {
            Cred::credential_helper(git_config, url, Some(username))
        } else {
            Err(git2::Error::from_str(&format!(
                "no credentials available for {url}"
            )))
        }
    });
    callbacks.certificate_check(check_certificate);

    let mut fetch_options = FetchOptions::new();
    fetch_options
        .remote_callbacks(callbacks)
        .download_tags(AutotagOption::None);
    fetch_options
}

/// Accepts SSH host keys listed in the system-wide known hosts file and leaves every
/// other decision to libgit2.
fn check_certificate(
    certificate: &Cert<'_>,
    host: &str,
) -> Result<CertificateCheckStatus, git2::Error> {
    let Some(host_key) = certificate.as_hostkey().and_then(|key| key.hostkey()) else {
        return Ok(CertificateCheckStatus::CertificatePassthrough);
    };

    let entries = match KnownHosts::read_file(GLOBAL_KNOWN_HOSTS) {
        Ok(entries) => entries,
        Err(error) => {
            trace!("Could not read {}: {}", GLOBAL_KNOWN_HOSTS, error);
            return Ok(CertificateCheckStatus::CertificatePassthrough);
        }
    };

    let known = entries.iter().any(|entry| {
        is_known_host(host, entry.host_patterns())
            && entry.public_key().to_bytes().as_deref() == Ok(host_key)
    });
    if known {
        trace!("Host key of {} is in {}", host, GLOBAL_KNOWN_HOSTS);
        Ok(CertificateCheckStatus::CertificateOk)
    } else {
        trace!("Host key of {} is not in {}", host, GLOBAL_KNOWN_HOSTS);
        Ok(CertificateCheckStatus::CertificatePassthrough)
    }
}

/// Plain and negated (`!host`) patterns. Wildcards and hashed names never match.
fn is_known_host(host: &str, patterns: &HostPatterns) -> bool {
    let HostPatterns::Patterns(patterns) = patterns else {
        return false;
    };
    let patterns: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();
    let negated = patterns
        .iter()
        .any(|pattern| pattern.strip_prefix('!') == Some(host));
    !negated && patterns.iter().any(|pattern| pattern == host)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use git2::{IndexAddOption, Signature};

    use super::*;

    use pretty_assertions::assert_eq;

    /// A local origin repository with one commit on the default branch carrying a
    /// lightweight tag `test-1.0.0`, and a second commit with an annotated tag `v2.0.0`.
    /// A third commit is only referenced by `refs/pull/1/head`, outside of branches and
    /// tags.
    pub(crate) struct OriginRepository {
        pub path: PathBuf,
        pub branch: String,
        pub first_commit: String,
        pub second_commit: String,
        pub pull_request_commit: String,
    }

    fn commit_file(
        repo: &Repository,
        reference: &str,
        file: &str,
        parents: &[&git2::Commit],
    ) -> Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        std::fs::write(workdir.join(file), file).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some(reference), &signature, &signature, file, &tree, parents)
            .unwrap()
    }

    pub(crate) fn create_origin(root: &Path) -> OriginRepository {
        let path = root.join("origin");
        let repo = Repository::init(&path).unwrap();

        let first = commit_file(&repo, "HEAD", "README.md", &[]);
        let first_commit = repo.find_commit(first).unwrap();
        repo.tag_lightweight("test-1.0.0", first_commit.as_object(), false)
            .unwrap();

        let second = commit_file(&repo, "HEAD", "LICENSE", &[&first_commit]);
        let second_commit = repo.find_commit(second).unwrap();
        let signature = Signature::now("Test", "test@example.com").unwrap();
        repo.tag(
            "v2.0.0",
            second_commit.as_object(),
            &signature,
            "Release 2.0.0",
            false,
        )
        .unwrap();

        let branch = repo.head().unwrap().shorthand().unwrap().to_owned();
        let pull_request =
            commit_file(&repo, "refs/pull/1/head", "CHANGELOG", &[&second_commit]);

        OriginRepository {
            path,
            branch,
            first_commit: first.to_string(),
            second_commit: second.to_string(),
            pull_request_commit: pull_request.to_string(),
        }
    }

    fn open(root: &Path, origin: &OriginRepository) -> Box<dyn WorkingTree> {
        Git.open_working_tree(
            &root.join("cache/worktree"),
            origin.path.to_str().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn list_tags() {
        let root = tempfile::tempdir().unwrap();
        let origin = create_origin(root.path());
        let tree = open(root.path(), &origin);

        let mut tags = tree.list_tags().unwrap();
        tags.sort();
        assert_eq!(tags, vec!["test-1.0.0".to_owned(), "v2.0.0".to_owned()]);
    }

    #[test]
    fn resolve_tags_to_commits() {
        let root = tempfile::tempdir().unwrap();
        let origin = create_origin(root.path());
        let mut tree = open(root.path(), &origin);

        assert_eq!(
            tree.resolve_revision("test-1.0.0").unwrap(),
            Some(ResolvedRevision::fixed(origin.first_commit.clone()))
        );
        assert_eq!(
            tree.resolve_revision("v2.0.0").unwrap(),
            Some(ResolvedRevision::fixed(origin.second_commit.clone()))
        );
    }

    #[test]
    fn resolve_branch_as_moving_revision() {
        let root = tempfile::tempdir().unwrap();
        let origin = create_origin(root.path());
        let mut tree = open(root.path(), &origin);

        assert_eq!(
            tree.resolve_revision(&origin.branch).unwrap(),
            Some(ResolvedRevision::moving(origin.second_commit.clone()))
        );
    }

    #[test]
    fn resolve_commits() {
        let root = tempfile::tempdir().unwrap();
        let origin = create_origin(root.path());
        let mut tree = open(root.path(), &origin);

        assert_eq!(
            tree.resolve_revision(&origin.first_commit).unwrap(),
            Some(ResolvedRevision::fixed(origin.first_commit.clone()))
        );
        assert_eq!(
            tree.resolve_revision(&origin.first_commit[..10]).unwrap(),
            Some(ResolvedRevision::fixed(origin.first_commit.clone()))
        );
    }

    #[test]
    fn fetch_commit_outside_branches_and_tags() {
        let root = tempfile::tempdir().unwrap();
        let origin = create_origin(root.path());
        let mut tree = open(root.path(), &origin);

        assert_eq!(tree.list_tags().unwrap().len(), 2);
        assert_eq!(
            tree.resolve_revision(&origin.pull_request_commit).unwrap(),
            Some(ResolvedRevision::fixed(origin.pull_request_commit.clone()))
        );
    }

    #[test]
    fn known_host_patterns() {
        let patterns = |patterns: &[&str]| {
            HostPatterns::Patterns(patterns.iter().map(|p| p.to_string()).collect())
        };
        assert!(is_known_host("github.com", &patterns(&["GitHub.com", "gitlab.com"])));
        assert!(!is_known_host("github.com", &patterns(&["gitlab.com"])));
        assert!(!is_known_host(
            "github.com",
            &patterns(&["github.com", "!github.com"])
        ));
    }

    #[test]
    fn unknown_revision_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let origin = create_origin(root.path());
        let mut tree = open(root.path(), &origin);

        assert_eq!(tree.resolve_revision("non-existing-revision").unwrap(), None);
        assert_eq!(
            tree.resolve_revision("0000000000000000000000000000000000000000")
                .unwrap(),
            None
        );
    }

    #[test]
    fn reopen_existing_working_tree() {
        let root = tempfile::tempdir().unwrap();
        let origin = create_origin(root.path());
        drop(open(root.path(), &origin));

        let mut tree = open(root.path(), &origin);
        assert_eq!(
            tree.resolve_revision("test-1.0.0").unwrap(),
            Some(ResolvedRevision::fixed(origin.first_commit.clone()))
        );
    }

    #[test]
    fn repair_broken_working_tree() {
        let root = tempfile::tempdir().unwrap();
        let origin = create_origin(root.path());
        let directory = root.path().join("cache/worktree");
        std::fs::create_dir_all(&directory).unwrap();
        std::fs::write(directory.join("garbage"), "interrupted clone").unwrap();

        let tree = open(root.path(), &origin);
        assert_eq!(tree.list_tags().unwrap().len(), 2);
    }

    #[test]
    fn unreachable_remote() {
        let root = tempfile::tempdir().unwrap();
        let result = Git.open_working_tree(
            &root.path().join("cache/worktree"),
            root.path().join("does-not-exist").to_str().unwrap(),
        );
        assert!(matches!(result, Err(VcsError::Unavailable { .. })));
    }
}
