use std::{error::Error, path::Path};

use log::{debug, info};
use serde::Serialize;

use crate::{
    cache::WorkingTreeCache,
    model::{report::ProvenanceReport, Identifier, PackageList, ResolutionResult},
    Provenant,
};

/// Handler to resolve command
/// Reads the package list, resolves every package and writes the provenance report
pub async fn do_resolve(
    provenant: &Provenant,
    packages_file: &Path,
    output_file: &Path,
) -> Result<ProvenanceReport, Box<dyn Error>> {
    let package_list = PackageList::from_file(packages_file)?;
    info!(
        "Resolving the provenance of {} packages from {}",
        package_list.packages.len(),
        packages_file.display()
    );

    let report = provenant.resolve_all(package_list.packages).await?;
    debug!("Generated report: {:?}", report);

    std::fs::write(output_file, report.to_string()?)?;
    info!("Wrote provenance report to {}", output_file.display());

    Ok(report)
}

#[derive(Serialize)]
struct StoredResults<'a> {
    id: &'a Identifier,
    results: &'a [ResolutionResult],
}

/// Handler to show command
pub fn do_show(provenant: &Provenant, id: &Identifier) -> Result<(), Box<dyn Error>> {
    let results = provenant.stored_results(id)?;
    if results.is_empty() {
        info!("No stored results for {}", id);
        return Ok(());
    }

    let stored = StoredResults {
        id,
        results: &results,
    };
    print!("{}", toml::to_string_pretty(&stored)?);
    Ok(())
}

/// Handler to forget command
pub fn do_forget(provenant: &Provenant, id: &Identifier) -> Result<usize, Box<dyn Error>> {
    let removed = provenant.resolver().storage().remove(id)?;
    if removed == 0 {
        info!("No stored results for {}, nothing to do", id);
    } else {
        info!("Forgot {} stored results for {}", removed, id);
    }
    Ok(removed)
}

pub fn do_clear_cache(cache: &WorkingTreeCache) -> Result<(), Box<dyn Error>> {
    cache.clear()?;
    Ok(())
}
