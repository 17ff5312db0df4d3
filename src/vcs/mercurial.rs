use std::path::Path;

use log::{debug, info};

use crate::model::VcsType;

use super::{command, ResolvedRevision, VcsError, VersionControl, WorkingTree};

const HG: &str = "hg";

/// Mercurial backend driving the `hg` command line client.
pub struct Mercurial;

impl VersionControl for Mercurial {
    fn vcs_type(&self) -> VcsType {
        VcsType::Mercurial
    }

    fn open_working_tree(
        &self,
        directory: &Path,
        url: &str,
    ) -> Result<Box<dyn WorkingTree>, VcsError> {
        let output = if directory.join(".hg").is_dir() {
            debug!("Pulling {} into {}", url, directory.display());
            command::run(HG, &["pull", "--noninteractive", url], Some(directory))?
        } else {
            info!("Cloning {}", url);
            let target = directory.to_string_lossy().into_owned();
            if directory.exists() {
                std::fs::remove_dir_all(directory)?;
            }
            if let Some(parent) = directory.parent() {
                std::fs::create_dir_all(parent)?;
            }
            command::run(
                HG,
                &[
                    "clone",
                    "--noninteractive",
                    "--noupdate",
                    url,
                    target.as_str(),
                ],
                None,
            )?
        };

        if !output.success {
            return Err(VcsError::Unavailable {
                url: url.to_owned(),
                reason: output.stderr.trim().to_owned(),
            });
        }

        Ok(Box::new(MercurialWorkingTree {
            directory: directory.to_path_buf(),
        }))
    }
}

pub struct MercurialWorkingTree {
    directory: std::path::PathBuf,
}

impl WorkingTree for MercurialWorkingTree {
    fn list_tags(&self) -> Result<Vec<String>, VcsError> {
        let stdout = command::run_checked(
            HG,
            &["tags", "--template", "{tag}\\n"],
            Some(&self.directory),
        )?;
        Ok(parse_tags(&stdout))
    }

    fn resolve_revision(&mut self, revision: &str) -> Result<Option<ResolvedRevision>, VcsError> {
        let output = command::run(
            HG,
            &["log", "--rev", revision, "--limit", "1", "--template", "{node}"],
            Some(&self.directory),
        )?;
        let node = output.stdout.trim();
        if !output.success || node.is_empty() {
            debug!(
                "Mercurial revision {} not found: {}",
                revision,
                output.stderr.trim()
            );
            return Ok(None);
        }

        let is_tag = self.list_tags()?.iter().any(|tag| tag == revision);
        let is_node = node.starts_with(&revision.to_ascii_lowercase());
        if is_tag || is_node {
            Ok(Some(ResolvedRevision::fixed(node)))
        } else {
            Ok(Some(ResolvedRevision::moving(node)))
        }
    }
}

fn parse_tags(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|tag| !tag.is_empty() && *tag != "tip")
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    const USERNAME: &str = "ui.username=Test <test@example.com>";

    struct Origin {
        path: std::path::PathBuf,
        tagged_node: String,
        tip_node: String,
    }

    /// A local repository whose first changeset is tagged `1.0.0`. Tagging adds a second
    /// changeset on `default`.
    fn create_origin(root: &Path) -> Origin {
        let path = root.join("origin");
        command::run_checked(HG, &["init", path.to_str().unwrap()], None).unwrap();
        std::fs::write(path.join("README"), "readme").unwrap();
        command::run_checked(HG, &["add", "README"], Some(&path)).unwrap();
        command::run_checked(
            HG,
            &["commit", "--config", USERNAME, "-m", "first"],
            Some(&path),
        )
        .unwrap();
        command::run_checked(HG, &["tag", "--config", USERNAME, "1.0.0"], Some(&path)).unwrap();

        let node = |revision: &str| {
            command::run_checked(
                HG,
                &["log", "--rev", revision, "--template", "{node}"],
                Some(&path),
            )
            .unwrap()
        };
        Origin {
            tagged_node: node("0"),
            tip_node: node("tip"),
            path: path.clone(),
        }
    }

    #[test]
    fn resolve_revisions_in_local_repository() {
        if command::run(HG, &["--version", "--quiet"], None).is_err() {
            eprintln!("hg is not installed, skipping");
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let origin = create_origin(root.path());
        let clone = root.path().join("clone");

        let mut tree = Mercurial
            .open_working_tree(&clone, origin.path.to_str().unwrap())
            .unwrap();

        assert_eq!(tree.list_tags().unwrap(), vec!["1.0.0".to_owned()]);
        assert_eq!(
            tree.resolve_revision("1.0.0").unwrap(),
            Some(ResolvedRevision::fixed(origin.tagged_node.clone()))
        );
        assert_eq!(
            tree.resolve_revision(&origin.tagged_node[..12]).unwrap(),
            Some(ResolvedRevision::fixed(origin.tagged_node.clone()))
        );
        assert_eq!(
            tree.resolve_revision("default").unwrap(),
            Some(ResolvedRevision::moving(origin.tip_node.clone()))
        );
        assert_eq!(tree.resolve_revision("2.0.0").unwrap(), None);

        // A second open pulls into the existing clone.
        let mut tree = Mercurial
            .open_working_tree(&clone, origin.path.to_str().unwrap())
            .unwrap();
        assert_eq!(
            tree.resolve_revision("1.0.0").unwrap(),
            Some(ResolvedRevision::fixed(origin.tagged_node))
        );
    }

    #[test]
    fn tip_is_not_a_tag() {
        assert_eq!(
            parse_tags("tip\n1.0.0\nv0.9\n\n"),
            vec!["1.0.0".to_owned(), "v0.9".to_owned()]
        );
    }
}
