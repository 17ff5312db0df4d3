use serde::{Deserialize, Serialize};

use crate::model::{RemoteArtifact, SourceCodeOrigin, VcsInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactProvenance {
    pub source_artifact: RemoteArtifact,
}

/// A repository locator together with the concrete revision it resolved to.
///
/// `resolved_revision` is always a commit hash or a numeric revision, even when
/// `vcs_info.revision` names a tag or a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryProvenance {
    pub vcs_info: VcsInfo,
    pub resolved_revision: String,
}

/// Where the source code of a package actually came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    #[serde(rename = "artifact")]
    Artifact(ArtifactProvenance),
    #[serde(rename = "repository")]
    Repository(RepositoryProvenance),
}

impl From<ArtifactProvenance> for Provenance {
    fn from(provenance: ArtifactProvenance) -> Self {
        Provenance::Artifact(provenance)
    }
}

impl From<RepositoryProvenance> for Provenance {
    fn from(provenance: RepositoryProvenance) -> Self {
        Provenance::Repository(provenance)
    }
}

/// The source code origin a resolution was attempted for. Together with the package
/// identifier this is the key of a stored [`ResolutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OriginDescriptor {
    #[serde(rename = "artifact")]
    Artifact(RemoteArtifact),
    #[serde(rename = "vcs")]
    Vcs(VcsInfo),
}

impl OriginDescriptor {
    pub fn origin(&self) -> SourceCodeOrigin {
        match self {
            OriginDescriptor::Artifact(_) => SourceCodeOrigin::Artifact,
            OriginDescriptor::Vcs(_) => SourceCodeOrigin::Vcs,
        }
    }
}

/// Persisted outcome of a resolution attempt, failures included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionResult {
    #[serde(rename = "artifact")]
    Artifact(ArtifactProvenance),
    #[serde(rename = "repository")]
    Repository {
        provenance: RepositoryProvenance,
        /// False if the revision was a moving reference such as a branch.
        is_fixed_revision: bool,
    },
    #[serde(rename = "unresolved")]
    Unresolved { message: String },
}

impl ResolutionResult {
    pub fn provenance(&self) -> Option<Provenance> {
        match self {
            ResolutionResult::Artifact(provenance) => Some(provenance.clone().into()),
            ResolutionResult::Repository { provenance, .. } => Some(provenance.clone().into()),
            ResolutionResult::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, ResolutionResult::Unresolved { .. })
    }
}
