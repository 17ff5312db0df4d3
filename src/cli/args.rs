use std::path::PathBuf;

use clap::Parser;

use crate::{
    model::{Identifier, SourceCodeOrigin},
    resolver::ReResolution,
};

/// Resolves and caches where the source code of third-party packages comes from.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Location of the working tree cache [default: $HOME/.provenant/cache]
    #[clap(long, global = true)]
    pub cache_directory: Option<PathBuf>,
    /// File in which resolution results are stored [default: <cache>/provenance.toml]
    #[clap(long, global = true)]
    pub storage_file: Option<PathBuf>,
    /// Source code origins to try, in order of preference [default: vcs,artifact]
    #[clap(long, global = true, value_delimiter = ',')]
    pub origins: Option<Vec<SourceCodeOrigin>>,
    /// Stored results to resolve again: never, unresolved or all [default: never]
    #[clap(long, global = true)]
    pub retry: Option<ReResolution>,
    /// Maximum number of packages resolved at the same time
    #[clap(short, long, global = true)]
    pub jobs: Option<usize>,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Resolves the provenance of all packages in a package list and writes a report
    Resolve {
        #[clap(short, long, env = "PROVENANT_PACKAGES", default_value = "packages.toml")]
        packages: PathBuf,
        #[clap(short, long, env = "PROVENANT_OUTPUT", default_value = "provenance.lock")]
        output: PathBuf,
    },
    /// Shows the stored results for a package identifier
    Show { id: Identifier },
    /// Forgets the stored results for a package identifier
    Forget { id: Identifier },
    /// Deletes all cached working trees
    ClearCache,
}
