use std::time::Duration;

use log::trace;

use crate::model::{ArtifactProvenance, RemoteArtifact};

use super::ResolutionError;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Confirms that a source artifact exists without downloading it.
pub trait ArtifactResolver: Send + Sync {
    fn resolve(&self, artifact: &RemoteArtifact) -> Result<ArtifactProvenance, ResolutionError>;
}

/// Checks artifacts with an HTTP `HEAD` request, falling back to `GET` for servers that
/// do not allow `HEAD`. The declared hash is carried forward unchecked.
pub struct HttpArtifactResolver {
    agent: ureq::Agent,
}

impl Default for HttpArtifactResolver {
    fn default() -> Self {
        HttpArtifactResolver::new(DEFAULT_HTTP_TIMEOUT)
    }
}

impl HttpArtifactResolver {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        HttpArtifactResolver { agent }
    }

    fn check(&self, url: &str) -> Result<(), ureq::Error> {
        trace!("HEAD {}", url);
        match self.agent.head(url).call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(405)) => {
                trace!("HEAD not allowed, GET {}", url);
                self.agent.get(url).call().map(|_| ())
            }
            Err(error) => Err(error),
        }
    }
}

impl ArtifactResolver for HttpArtifactResolver {
    fn resolve(&self, artifact: &RemoteArtifact) -> Result<ArtifactProvenance, ResolutionError> {
        self.check(&artifact.url)
            .map_err(|error| ResolutionError::ArtifactNotFound {
                url: artifact.url.clone(),
                reason: error.to_string(),
            })?;
        Ok(ArtifactProvenance {
            source_artifact: artifact.clone(),
        })
    }
}
