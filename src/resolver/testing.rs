use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crate::model::{ArtifactProvenance, RemoteArtifact};

use super::{ArtifactResolver, ResolutionError};

/// Knows a fixed set of artifact URLs and counts how often it was asked, i.e. how many
/// HTTP requests a real resolver would have made.
pub(crate) struct FakeArtifactResolver {
    available: HashSet<String>,
    calls: Arc<AtomicUsize>,
}

impl FakeArtifactResolver {
    pub fn new(available: &[&str]) -> Self {
        FakeArtifactResolver {
            available: available.iter().map(|url| url.to_string()).collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl ArtifactResolver for FakeArtifactResolver {
    fn resolve(&self, artifact: &RemoteArtifact) -> Result<ArtifactProvenance, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available.contains(&artifact.url) {
            Ok(ArtifactProvenance {
                source_artifact: artifact.clone(),
            })
        } else {
            Err(ResolutionError::ArtifactNotFound {
                url: artifact.url.clone(),
                reason: "404 Not Found".to_owned(),
            })
        }
    }
}
