//! Determining the provenance of packages.
//!
//! [`PackageProvenanceResolver`] tries the source code origins of a package in the order
//! given by the caller, consulting and feeding a [`ProvenanceStorage`] on the way.

mod artifact;
mod revision;
mod tags;

#[cfg(test)]
pub(crate) mod testing;

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    model::{
        Identifier, OriginDescriptor, Package, ParseError, Provenance, ResolutionResult,
        SourceCodeOrigin,
    },
    storage::ProvenanceStorage,
};

pub use self::{
    artifact::{ArtifactResolver, HttpArtifactResolver, DEFAULT_HTTP_TIMEOUT},
    revision::RevisionResolver,
    tags::{TagGuesser, TagNamingConvention, TagTemplate},
};

/// Why a single origin did not yield a provenance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Source artifact {url} could not be found: {reason}")]
    ArtifactNotFound { url: String, reason: String },
    #[error("Revision `{revision}` does not exist in {url}")]
    RevisionNotFound { url: String, revision: String },
    #[error("No tag in {url} matches version {version} of {name}")]
    NoMatchingTag {
        url: String,
        name: String,
        version: String,
    },
    #[error("Repository {url} is unavailable: {reason}")]
    RepositoryUnavailable { url: String, reason: String },
    #[error("Package has no {0} origin")]
    MissingOrigin(SourceCodeOrigin),
    /// A failure stored by an earlier resolution, with its original message.
    #[error("{0}")]
    PreviouslyUnresolved(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginFailure {
    pub origin: SourceCodeOrigin,
    pub error: ResolutionError,
}

impl Display for OriginFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.origin, self.error)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvenanceError {
    #[error("No provenance resolvable for {id}: {}", describe(.causes))]
    NoProvenanceResolvable {
        id: Identifier,
        causes: Vec<OriginFailure>,
    },
    #[error("Resolution was interrupted")]
    Interrupted,
}

fn describe(causes: &[OriginFailure]) -> String {
    if causes.is_empty() {
        return "no source code origins to try".to_owned();
    }
    causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Which stored results are resolved again instead of being reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReResolution {
    /// Reuse every stored result, failures included.
    #[default]
    #[serde(rename = "never")]
    Never,
    /// Retry origins that failed before.
    #[serde(rename = "unresolved")]
    Unresolved,
    /// Ignore stored results. New results are still stored.
    #[serde(rename = "all")]
    All,
}

impl FromStr for ReResolution {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "never" => Ok(ReResolution::Never),
            "unresolved" => Ok(ReResolution::Unresolved),
            "all" => Ok(ReResolution::All),
            _ => Err(ParseError::InvalidReResolution(value.to_owned())),
        }
    }
}

impl Display for ReResolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReResolution::Never => f.write_str("never"),
            ReResolution::Unresolved => f.write_str("unresolved"),
            ReResolution::All => f.write_str("all"),
        }
    }
}

pub struct PackageProvenanceResolver {
    storage: Arc<dyn ProvenanceStorage>,
    artifact_resolver: Box<dyn ArtifactResolver>,
    revision_resolver: RevisionResolver,
    re_resolution: ReResolution,
    interrupted: AtomicBool,
}

impl PackageProvenanceResolver {
    pub fn new(
        storage: Arc<dyn ProvenanceStorage>,
        artifact_resolver: Box<dyn ArtifactResolver>,
        revision_resolver: RevisionResolver,
    ) -> Self {
        PackageProvenanceResolver {
            storage,
            artifact_resolver,
            revision_resolver,
            re_resolution: ReResolution::default(),
            interrupted: AtomicBool::new(false),
        }
    }

    pub fn with_re_resolution(mut self, re_resolution: ReResolution) -> Self {
        self.re_resolution = re_resolution;
        self
    }

    pub fn storage(&self) -> &Arc<dyn ProvenanceStorage> {
        &self.storage
    }

    pub fn revision_resolver(&self) -> &RevisionResolver {
        &self.revision_resolver
    }

    /// Stops trying further origins and storing results. Resolutions already talking to
    /// a remote finish, but their results are dropped.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Returns the provenance from the first of `origins` that yields one.
    pub fn resolve_provenance(
        &self,
        package: &Package,
        origins: &[SourceCodeOrigin],
    ) -> Result<Provenance, ProvenanceError> {
        let mut causes = Vec::new();

        for &origin in origins {
            if self.is_interrupted() {
                return Err(ProvenanceError::Interrupted);
            }
            match self.resolve_origin(package, origin) {
                Ok(provenance) => return Ok(provenance),
                Err(error) => {
                    debug!("No {} provenance for {}: {}", origin, package.id, error);
                    causes.push(OriginFailure { origin, error });
                }
            }
        }
        if self.is_interrupted() {
            return Err(ProvenanceError::Interrupted);
        }

        Err(ProvenanceError::NoProvenanceResolvable {
            id: package.id.clone(),
            causes,
        })
    }

    fn resolve_origin(
        &self,
        package: &Package,
        origin: SourceCodeOrigin,
    ) -> Result<Provenance, ResolutionError> {
        let descriptor = match origin {
            SourceCodeOrigin::Artifact if !package.source_artifact.is_empty() => {
                OriginDescriptor::Artifact(package.source_artifact.clone())
            }
            SourceCodeOrigin::Vcs if !package.vcs_processed.is_empty() => {
                OriginDescriptor::Vcs(package.vcs_processed.clone())
            }
            _ => return Err(ResolutionError::MissingOrigin(origin)),
        };

        if let Some(stored) = self.stored_result(&package.id, &descriptor) {
            return into_provenance(stored);
        }

        let result = match &descriptor {
            OriginDescriptor::Artifact(artifact) => self
                .artifact_resolver
                .resolve(artifact)
                .map(ResolutionResult::Artifact),
            OriginDescriptor::Vcs(vcs) => self.revision_resolver.resolve(vcs, &package.id).map(
                |(provenance, is_fixed_revision)| ResolutionResult::Repository {
                    provenance,
                    is_fixed_revision,
                },
            ),
        };

        match result {
            Ok(result) => {
                self.store(&package.id, &descriptor, &result);
                into_provenance(result)
            }
            Err(error) => {
                self.store(
                    &package.id,
                    &descriptor,
                    &ResolutionResult::Unresolved {
                        message: error.to_string(),
                    },
                );
                Err(error)
            }
        }
    }

    fn stored_result(
        &self,
        id: &Identifier,
        descriptor: &OriginDescriptor,
    ) -> Option<ResolutionResult> {
        if self.re_resolution == ReResolution::All {
            return None;
        }

        let stored = match self.storage.read(id, descriptor) {
            Ok(stored) => stored?,
            Err(error) => {
                warn!("Could not read stored provenance of {}: {}", id, error);
                return None;
            }
        };

        match stored {
            ResolutionResult::Unresolved { .. } if self.re_resolution == ReResolution::Unresolved => {
                debug!("Retrying {} origin of {}", descriptor.origin(), id);
                None
            }
            ResolutionResult::Repository {
                is_fixed_revision: false,
                ..
            } => {
                debug!("Stored revision of {} may have moved, resolving again", id);
                None
            }
            stored => {
                debug!("Using stored {} result for {}", descriptor.origin(), id);
                Some(stored)
            }
        }
    }

    fn store(&self, id: &Identifier, descriptor: &OriginDescriptor, result: &ResolutionResult) {
        if self.is_interrupted() {
            debug!("Not storing the result for {} after an interruption", id);
            return;
        }
        if let Err(error) = self.storage.write(id, descriptor, result) {
            warn!("Could not store provenance of {}: {}", id, error);
        }
    }
}

fn into_provenance(result: ResolutionResult) -> Result<Provenance, ResolutionError> {
    match result {
        ResolutionResult::Artifact(provenance) => Ok(provenance.into()),
        ResolutionResult::Repository { provenance, .. } => Ok(provenance.into()),
        ResolutionResult::Unresolved { message } => {
            Err(ResolutionError::PreviouslyUnresolved(message))
        }
    }
}
