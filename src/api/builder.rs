use std::{error::Error, num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};

use home::home_dir;
use log::debug;

use crate::{
    cache::WorkingTreeCache,
    config::ProvenantConfig,
    model::SourceCodeOrigin,
    resolver::{
        ArtifactResolver, HttpArtifactResolver, PackageProvenanceResolver, ReResolution,
        RevisionResolver, TagGuesser, DEFAULT_HTTP_TIMEOUT,
    },
    storage::{FileProvenanceStorage, ProvenanceStorage},
    vcs::VcsRegistry,
    Provenant,
};

const DEFAULT_STORAGE_FILE_NAME: &str = "provenance.toml";

#[derive(Default)]
pub struct ProvenantBuilder {
    cache_directory_path: Option<PathBuf>,
    storage_file: Option<PathBuf>,
    storage: Option<Arc<dyn ProvenanceStorage>>,
    origins: Option<Vec<SourceCodeOrigin>>,
    re_resolution: Option<ReResolution>,
    jobs: Option<usize>,
    http_timeout: Option<Duration>,
    artifact_resolver: Option<Box<dyn ArtifactResolver>>,
    vcs_registry: Option<VcsRegistry>,
    tag_guesser: Option<TagGuesser>,
}

impl ProvenantBuilder {
    /// Applies every value that is set in `config`.
    pub fn config(mut self, config: ProvenantConfig) -> Self {
        let ProvenantConfig {
            cache_dir,
            storage_file,
            origins,
            re_resolution,
            jobs,
            http_timeout,
        } = config;
        self.cache_directory_path = cache_dir.or(self.cache_directory_path);
        self.storage_file = storage_file.or(self.storage_file);
        self.origins = origins.or(self.origins);
        self.re_resolution = re_resolution.or(self.re_resolution);
        self.jobs = jobs.or(self.jobs);
        self.http_timeout = http_timeout.or(self.http_timeout);
        self
    }

    /// Location of the working tree cache.
    ///
    /// Defaults to `$HOME/.provenant/cache`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// File in which resolution results are stored.
    ///
    /// Defaults to `provenance.toml` in the cache directory.
    pub fn storage_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_file = Some(path.into());
        self
    }

    /// Uses `storage` instead of a storage file.
    pub fn storage(mut self, storage: Arc<dyn ProvenanceStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Origins to try, in order of preference.
    ///
    /// Defaults to VCS first, then the source artifact.
    pub fn origins(mut self, origins: Vec<SourceCodeOrigin>) -> Self {
        self.origins = Some(origins);
        self
    }

    pub fn re_resolution(mut self, re_resolution: ReResolution) -> Self {
        self.re_resolution = Some(re_resolution);
        self
    }

    /// Maximum number of packages resolved at the same time.
    ///
    /// Defaults to the available parallelism.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Timeout of artifact existence checks. Ignored if an artifact resolver is set.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn artifact_resolver(mut self, resolver: impl ArtifactResolver + 'static) -> Self {
        self.artifact_resolver = Some(Box::new(resolver));
        self
    }

    /// Defaults to git, Subversion and Mercurial.
    pub fn vcs_registry(mut self, registry: VcsRegistry) -> Self {
        self.vcs_registry = Some(registry);
        self
    }

    pub fn tag_guesser(mut self, tag_guesser: TagGuesser) -> Self {
        self.tag_guesser = Some(tag_guesser);
        self
    }

    pub fn try_build(self) -> Result<Provenant, Box<dyn Error>> {
        let Self {
            cache_directory_path,
            storage_file,
            storage,
            origins,
            re_resolution,
            jobs,
            http_timeout,
            artifact_resolver,
            vcs_registry,
            tag_guesser,
        } = self;

        let cache_directory = match cache_directory_path {
            Some(path) => path,
            None => default_cache_directory()?,
        };

        let storage: Arc<dyn ProvenanceStorage> = match storage {
            Some(storage) => storage,
            None => {
                let storage_file = storage_file
                    .unwrap_or_else(|| cache_directory.join(DEFAULT_STORAGE_FILE_NAME));
                debug!("Using storage file {}", storage_file.display());
                Arc::new(FileProvenanceStorage::open(storage_file)?)
            }
        };

        let artifact_resolver: Box<dyn ArtifactResolver> = match artifact_resolver {
            Some(resolver) => resolver,
            None => Box::new(HttpArtifactResolver::new(
                http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT),
            )),
        };

        let cache = WorkingTreeCache::new(
            cache_directory,
            vcs_registry.unwrap_or_else(VcsRegistry::with_defaults),
        )?;
        let revision_resolver = RevisionResolver::new(Arc::new(cache))
            .with_tag_guesser(tag_guesser.unwrap_or_default());

        let resolver =
            PackageProvenanceResolver::new(storage, artifact_resolver, revision_resolver)
                .with_re_resolution(re_resolution.unwrap_or_default());

        let origins =
            origins.unwrap_or_else(|| vec![SourceCodeOrigin::Vcs, SourceCodeOrigin::Artifact]);

        let jobs = jobs
            .or_else(|| std::thread::available_parallelism().map(NonZeroUsize::get).ok())
            .unwrap_or(1)
            .max(1);

        Ok(Provenant {
            resolver: Arc::new(resolver),
            origins,
            jobs,
        })
    }
}

fn default_cache_directory() -> Result<PathBuf, Box<dyn Error>> {
    let mut cache_directory =
        home_dir().ok_or("Could not find home dir. Please define $HOME env variable.")?;
    cache_directory.push(".provenant/cache");
    Ok(cache_directory)
}
