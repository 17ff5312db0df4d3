use std::path::Path;

use log::{debug, info};

use crate::model::VcsType;

use super::{command, ResolvedRevision, VcsError, VersionControl, WorkingTree};

const SVN: &str = "svn";

/// Error codes the `svn` client reports for paths or revisions that do not exist.
const NOT_FOUND_CODES: [&str; 4] = ["E160006", "E160013", "E170000", "W170000"];

/// Subversion backend driving the `svn` command line client. Revisions are looked up
/// remotely, so the working tree is an empty checkout that only pins the repository.
pub struct Subversion;

impl VersionControl for Subversion {
    fn vcs_type(&self) -> VcsType {
        VcsType::Subversion
    }

    fn open_working_tree(
        &self,
        directory: &Path,
        url: &str,
    ) -> Result<Box<dyn WorkingTree>, VcsError> {
        let url = url.trim_end_matches('/').to_owned();

        if directory.join(".svn").is_dir() {
            debug!("Updating Subversion working tree {}", directory.display());
            let output = command::run(
                SVN,
                &["update", "--non-interactive", "--depth", "empty"],
                Some(directory),
            )?;
            if !output.success {
                return Err(unavailable(&url, &output.stderr));
            }
        } else {
            info!("Checking out {}", url);
            let target = directory.to_string_lossy().into_owned();
            if directory.exists() {
                std::fs::remove_dir_all(directory)?;
            }
            if let Some(parent) = directory.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let output = command::run(
                SVN,
                &[
                    "checkout",
                    "--non-interactive",
                    "--depth",
                    "empty",
                    url.as_str(),
                    target.as_str(),
                ],
                None,
            )?;
            if !output.success {
                return Err(unavailable(&url, &output.stderr));
            }
        }

        Ok(Box::new(SubversionWorkingTree { url }))
    }
}

fn unavailable(url: &str, stderr: &str) -> VcsError {
    VcsError::Unavailable {
        url: url.to_owned(),
        reason: stderr.trim().to_owned(),
    }
}

pub struct SubversionWorkingTree {
    url: String,
}

impl SubversionWorkingTree {
    /// Runs `svn info` for a single item; `None` if the target does not exist.
    fn info_item(
        &self,
        item: &str,
        target: &str,
        revision: Option<&str>,
    ) -> Result<Option<String>, VcsError> {
        let mut args = vec!["info", "--non-interactive", "--show-item", item];
        if let Some(revision) = revision {
            args.extend(["-r", revision]);
        }
        args.push(target);

        let output = command::run(SVN, &args, None)?;
        if output.success {
            Ok(Some(output.stdout.trim().to_owned()))
        } else if is_not_found(&output.stderr) {
            Ok(None)
        } else {
            Err(VcsError::Command {
                command: format!("{} {}", SVN, args.join(" ")),
                status: "a non-zero exit status".to_owned(),
                stderr: output.stderr.trim().to_owned(),
            })
        }
    }
}

impl WorkingTree for SubversionWorkingTree {
    fn list_tags(&self) -> Result<Vec<String>, VcsError> {
        let tags_url = format!("{}/tags", self.url);
        let output = command::run(
            SVN,
            &["list", "--non-interactive", tags_url.as_str()],
            None,
        )?;
        if !output.success {
            if is_not_found(&output.stderr) {
                return Ok(Vec::new());
            }
            return Err(unavailable(&self.url, &output.stderr));
        }
        Ok(parse_list(&output.stdout))
    }

    fn resolve_revision(&mut self, revision: &str) -> Result<Option<ResolvedRevision>, VcsError> {
        let revision = revision.trim_matches('/');

        if let Some(number) = parse_revision_number(revision) {
            let found = self.info_item("revision", &self.url, Some(number.as_str()))?;
            return Ok(found.map(|_| ResolvedRevision::fixed(number)));
        }

        if is_path_revision(revision) {
            let target = format!("{}/{}", self.url, revision);
            let found = self.info_item("last-changed-revision", &target, None)?;
            return Ok(found.map(|number| {
                if revision.starts_with("tags/") {
                    ResolvedRevision::fixed(number)
                } else {
                    ResolvedRevision::moving(number)
                }
            }));
        }

        Ok(None)
    }

    fn revision_for_tag(&self, tag: &str) -> String {
        format!("tags/{tag}")
    }
}

fn is_not_found(stderr: &str) -> bool {
    NOT_FOUND_CODES.iter().any(|code| stderr.contains(code))
}

fn parse_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.ends_with('/'))
        .map(|line| line.trim_end_matches('/').to_owned())
        .collect()
}

/// `1234` and `r1234` both address revision 1234.
fn parse_revision_number(revision: &str) -> Option<String> {
    let digits = revision.strip_prefix('r').unwrap_or(revision);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(digits.to_owned())
    } else {
        None
    }
}

fn is_path_revision(revision: &str) -> bool {
    revision == "trunk"
        || revision.starts_with("trunk/")
        || revision.starts_with("tags/")
        || revision.starts_with("branches/")
}
