use std::{error::Error, path::Path, sync::Arc};

use log::{debug, info, warn};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    cli::command_handlers::{do_clear_cache, do_forget, do_resolve, do_show},
    model::{
        report::{PackageProvenance, ProvenanceReport},
        Identifier, Package, Provenance, ResolutionResult, SourceCodeOrigin,
    },
    resolver::{PackageProvenanceResolver, ProvenanceError},
};

mod builder;

pub use builder::ProvenantBuilder;

pub struct Provenant {
    resolver: Arc<PackageProvenanceResolver>,
    origins: Vec<SourceCodeOrigin>,
    jobs: usize,
}

impl Provenant {
    pub fn builder() -> ProvenantBuilder {
        ProvenantBuilder::default()
    }

    pub fn origins(&self) -> &[SourceCodeOrigin] {
        &self.origins
    }

    pub fn resolver(&self) -> &PackageProvenanceResolver {
        &self.resolver
    }

    /// Resolves the provenance of a single package, trying the configured origins in
    /// order. Blocks while repositories are cloned.
    pub fn resolve(&self, package: &Package) -> Result<Provenance, ProvenanceError> {
        self.resolver.resolve_provenance(package, &self.origins)
    }

    /// Resolves all packages concurrently. A package without provenance, or whose
    /// resolution panicked, does not stop the others; its report entry lists the issues
    /// instead.
    ///
    /// Ctrl-C interrupts the batch: packages not started yet are skipped, results of
    /// packages in progress are not stored, and [`ProvenanceError::Interrupted`] is
    /// returned once the running resolutions have finished.
    pub async fn resolve_all(
        &self,
        packages: Vec<Package>,
    ) -> Result<ProvenanceReport, Box<dyn Error>> {
        let total = packages.len();
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut tasks = JoinSet::new();

        for (index, package) in packages.into_iter().enumerate() {
            let resolver = self.resolver.clone();
            let origins = self.origins.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let id = package.id.clone();
                let result = tokio::task::spawn_blocking(move || {
                    resolver.resolve_provenance(&package, &origins)
                })
                .await;
                (index, id, result)
            });
        }

        let mut entries: Vec<Option<PackageProvenance>> = (0..total).map(|_| None).collect();
        let mut done = 0;
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    let (index, id, result) = joined?;
                    done += 1;
                    debug!("Finished {} ({}/{})", id, done, total);
                    entries[index] = Some(match result {
                        Ok(result) => report_entry(id, result),
                        Err(error) => {
                            warn!("Resolution of {} failed: {}", id, error);
                            PackageProvenance {
                                id,
                                issues: vec![format!("Resolution failed: {error}")],
                                provenance: None,
                            }
                        }
                    });
                }
                _ = &mut interrupt, if !self.resolver.is_interrupted() => {
                    warn!("Interrupted, waiting for resolutions in progress to finish");
                    self.resolver.interrupt();
                }
            }
        }

        if self.resolver.is_interrupted() {
            return Err(ProvenanceError::Interrupted.into());
        }

        let report = ProvenanceReport {
            packages: entries.into_iter().flatten().collect(),
        };
        info!(
            "Resolved the provenance of {} out of {} packages",
            report.resolved_count(),
            total
        );
        Ok(report)
    }

    /// Stops a running [`Provenant::resolve_all`] as if Ctrl-C had been pressed.
    pub fn interrupt(&self) {
        self.resolver.interrupt();
    }

    /// Resolves the packages listed in `packages_file` and writes the report to
    /// `output_file`.
    pub async fn resolve_packages(
        &self,
        packages_file: &Path,
        output_file: &Path,
    ) -> Result<ProvenanceReport, Box<dyn Error>> {
        do_resolve(self, packages_file, output_file).await
    }

    pub fn stored_results(&self, id: &Identifier) -> Result<Vec<ResolutionResult>, Box<dyn Error>> {
        Ok(self.resolver.storage().read_all(id)?)
    }

    /// Prints every stored result for a package.
    pub fn show(&self, id: &Identifier) -> Result<(), Box<dyn Error>> {
        do_show(self, id)
    }

    /// Drops all stored results for a package, so that it is resolved again.
    pub fn forget(&self, id: &Identifier) -> Result<usize, Box<dyn Error>> {
        do_forget(self, id)
    }

    pub fn clear_cache(&self) -> Result<(), Box<dyn Error>> {
        do_clear_cache(self.resolver.revision_resolver().cache())
    }

    /// Waits for outstanding working tree leases and releases the cache.
    pub fn shutdown(&self) {
        self.resolver.revision_resolver().cache().shutdown();
    }
}

fn report_entry(id: Identifier, result: Result<Provenance, ProvenanceError>) -> PackageProvenance {
    match result {
        Ok(provenance) => PackageProvenance {
            id,
            issues: Vec::new(),
            provenance: Some(provenance),
        },
        Err(ProvenanceError::NoProvenanceResolvable { causes, .. }) if !causes.is_empty() => {
            PackageProvenance {
                id,
                issues: causes.iter().map(ToString::to_string).collect(),
                provenance: None,
            }
        }
        Err(error) => PackageProvenance {
            id,
            issues: vec![error.to_string()],
            provenance: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{
        model::{ArtifactProvenance, Hash, RemoteArtifact, VcsInfo, VcsType},
        resolver::{
            testing::FakeArtifactResolver, ArtifactResolver, ReResolution, ResolutionError,
        },
        vcs::{
            testing::{FakeRepository, FakeVersionControl},
            VcsRegistry,
        },
    };

    use super::*;

    use pretty_assertions::assert_eq;

    const REPOSITORY: &str = "https://example.com/org/left-pad";
    const COMMIT: &str = "1111111111111111111111111111111111111111";
    const ARTIFACT: &str = "https://example.com/six-1.16.0.tar.gz";

    fn provenant(root: &Path) -> (Provenant, Arc<AtomicUsize>) {
        let artifact_resolver = FakeArtifactResolver::new(&[ARTIFACT]);
        let calls = artifact_resolver.call_counter();
        (provenant_with(root, artifact_resolver), calls)
    }

    fn provenant_with(
        root: &Path,
        artifact_resolver: impl ArtifactResolver + 'static,
    ) -> Provenant {
        Provenant::builder()
            .cache_directory(root.join("cache"))
            .storage_file(root.join("provenance.toml"))
            .vcs_registry(VcsRegistry::empty().register(Arc::new(
                FakeVersionControl::new(VcsType::Git).repository(
                    REPOSITORY,
                    FakeRepository::default().tag("v1.3.0", COMMIT),
                ),
            )))
            .artifact_resolver(artifact_resolver)
            .origins(vec![SourceCodeOrigin::Artifact, SourceCodeOrigin::Vcs])
            .re_resolution(ReResolution::Never)
            .jobs(2)
            .try_build()
            .unwrap()
    }

    /// Panics for one URL, finds every other artifact.
    struct PanickingArtifactResolver(&'static str);

    impl ArtifactResolver for PanickingArtifactResolver {
        fn resolve(
            &self,
            artifact: &RemoteArtifact,
        ) -> Result<ArtifactProvenance, ResolutionError> {
            if artifact.url == self.0 {
                panic!("malformed response for {}", artifact.url);
            }
            Ok(ArtifactProvenance {
                source_artifact: artifact.clone(),
            })
        }
    }

    fn packages() -> Vec<Package> {
        vec![
            Package {
                id: Identifier::new("NPM", "", "left-pad", "1.3.0"),
                source_artifact: RemoteArtifact::default(),
                vcs_processed: VcsInfo::new(VcsType::Git, REPOSITORY, ""),
            },
            Package {
                id: Identifier::new("PyPI", "", "six", "1.16.0"),
                source_artifact: RemoteArtifact::new(ARTIFACT, Hash::none()),
                vcs_processed: VcsInfo::default(),
            },
            Package {
                id: Identifier::new("PyPI", "", "missing", "0.1.0"),
                source_artifact: RemoteArtifact::new(
                    "https://example.com/missing-0.1.0.tar.gz",
                    Hash::none(),
                ),
                vcs_processed: VcsInfo::default(),
            },
        ]
    }

    #[tokio::test]
    async fn resolve_all_keeps_package_order() {
        let root = tempfile::tempdir().unwrap();
        let (provenant, _) = provenant(root.path());

        let report = provenant.resolve_all(packages()).await.unwrap();

        let ids: Vec<String> = report.packages.iter().map(|p| p.id.to_string()).collect();
        assert_eq!(
            ids,
            vec!["NPM::left-pad:1.3.0", "PyPI::six:1.16.0", "PyPI::missing:0.1.0"]
        );
        assert_eq!(report.resolved_count(), 2);
        assert_eq!(
            report.packages[2].issues,
            vec![
                "artifact: Source artifact https://example.com/missing-0.1.0.tar.gz could not \
                 be found: 404 Not Found",
                "vcs: Package has no vcs origin",
            ]
        );
    }

    #[tokio::test]
    async fn results_are_reused_across_instances() {
        let root = tempfile::tempdir().unwrap();
        let (first, first_calls) = provenant(root.path());
        let report = first.resolve_all(packages()).await.unwrap();
        first.shutdown();
        drop(first);
        assert_eq!(first_calls.load(Ordering::SeqCst), 2);

        let (second, second_calls) = provenant(root.path());
        assert_eq!(second.resolve_all(packages()).await.unwrap(), report);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);

        let six = Identifier::new("PyPI", "", "six", "1.16.0");
        assert_eq!(second.stored_results(&six).unwrap().len(), 1);
        assert_eq!(second.forget(&six).unwrap(), 1);
        assert!(second.stored_results(&six).unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_resolution_does_not_stop_the_batch() {
        let root = tempfile::tempdir().unwrap();
        let provenant = provenant_with(
            root.path(),
            PanickingArtifactResolver("https://example.com/missing-0.1.0.tar.gz"),
        );

        let report = provenant.resolve_all(packages()).await.unwrap();

        assert_eq!(report.packages.len(), 3);
        assert_eq!(report.resolved_count(), 2);
        let failed = &report.packages[2];
        assert_eq!(failed.id, Identifier::new("PyPI", "", "missing", "0.1.0"));
        assert!(failed.provenance.is_none());
        assert_eq!(failed.issues.len(), 1);
        assert!(
            failed.issues[0].starts_with("Resolution failed: "),
            "{:?}",
            failed.issues
        );
    }

    #[tokio::test]
    async fn interrupted_batch() {
        let root = tempfile::tempdir().unwrap();
        let (provenant, _) = provenant(root.path());

        provenant.interrupt();
        let error = provenant.resolve_all(packages()).await.unwrap_err();

        assert_eq!(
            error.downcast_ref::<ProvenanceError>(),
            Some(&ProvenanceError::Interrupted)
        );
        for package in packages() {
            assert!(provenant.stored_results(&package.id).unwrap().is_empty());
        }
    }
}
