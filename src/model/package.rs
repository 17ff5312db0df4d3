use std::{
    fmt::{Display, Formatter},
    path::Path,
    str::FromStr,
};

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::model::{Identifier, ParseError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash {
    pub algorithm: String,
    pub value: String,
}

impl Hash {
    pub fn none() -> Self {
        Hash::default()
    }

    pub fn is_none(&self) -> bool {
        self.value.is_empty()
    }
}

/// A downloadable source bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteArtifact {
    pub url: String,
    #[serde(default, skip_serializing_if = "Hash::is_none")]
    pub hash: Hash,
}

impl RemoteArtifact {
    pub fn new(url: impl Into<String>, hash: Hash) -> Self {
        RemoteArtifact {
            url: url.into(),
            hash,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.url.trim().is_empty()
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum VcsType {
    #[serde(rename = "git")]
    Git,
    #[serde(rename = "subversion", alias = "svn")]
    Subversion,
    #[serde(rename = "mercurial", alias = "hg")]
    Mercurial,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl FromStr for VcsType {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "git" => Ok(VcsType::Git),
            "subversion" | "svn" => Ok(VcsType::Subversion),
            "mercurial" | "hg" => Ok(VcsType::Mercurial),
            "" | "unknown" => Ok(VcsType::Unknown),
            _ => Err(ParseError::InvalidVcsType(value.to_owned())),
        }
    }
}

impl Display for VcsType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VcsType::Git => f.write_str("git"),
            VcsType::Subversion => f.write_str("subversion"),
            VcsType::Mercurial => f.write_str("mercurial"),
            VcsType::Unknown => f.write_str("unknown"),
        }
    }
}

/// A declared, not yet verified repository locator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VcsInfo {
    #[serde(rename = "type", default)]
    pub vcs_type: VcsType,
    pub url: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl VcsInfo {
    pub fn new(vcs_type: VcsType, url: impl Into<String>, revision: impl Into<String>) -> Self {
        VcsInfo {
            vcs_type,
            url: url.into(),
            revision: revision.into(),
            path: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.url.trim().is_empty()
    }
}

/// Where to look for the source code of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceCodeOrigin {
    #[serde(rename = "artifact")]
    Artifact,
    #[serde(rename = "vcs")]
    Vcs,
}

impl FromStr for SourceCodeOrigin {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "artifact" => Ok(SourceCodeOrigin::Artifact),
            "vcs" => Ok(SourceCodeOrigin::Vcs),
            _ => Err(ParseError::InvalidSourceCodeOrigin(value.to_owned())),
        }
    }
}

impl Display for SourceCodeOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceCodeOrigin::Artifact => f.write_str("artifact"),
            SourceCodeOrigin::Vcs => f.write_str("vcs"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: Identifier,
    #[serde(default, skip_serializing_if = "RemoteArtifact::is_empty")]
    pub source_artifact: RemoteArtifact,
    #[serde(rename = "vcs", default, skip_serializing_if = "VcsInfo::is_empty")]
    pub vcs_processed: VcsInfo,
}

/// The packages of an analysed project, as produced by a manifest parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageList {
    #[serde(default)]
    pub packages: Vec<Package>,
}

impl PackageList {
    pub fn from_file(path: &Path) -> Result<PackageList, ParseError> {
        debug!("Reading package list from {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let packages = PackageList::from_toml_str(&contents);
        if let Err(err) = &packages {
            error!("Could not read packages from {}: {err}", path.display())
        }
        packages
    }

    pub fn from_toml_str(data: &str) -> Result<PackageList, ParseError> {
        Ok(toml::from_str(data)?)
    }
}
