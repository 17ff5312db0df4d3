use std::error::Error;

use clap::Parser;
use log::warn;

use provenant::{
    cli::args::{CliArgs, Command},
    config::ProvenantConfig,
    Provenant,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = CliArgs::parse();

    let config = ProvenantConfig::load()?;

    let mut builder = Provenant::builder().config(config);
    if let Some(cache_directory) = cli_args.cache_directory {
        builder = builder.cache_directory(cache_directory);
    }
    if let Some(storage_file) = cli_args.storage_file {
        builder = builder.storage_file(storage_file);
    }
    if let Some(origins) = cli_args.origins {
        builder = builder.origins(origins);
    }
    if let Some(retry) = cli_args.retry {
        builder = builder.re_resolution(retry);
    }
    if let Some(jobs) = cli_args.jobs {
        builder = builder.jobs(jobs);
    }
    let provenant = builder.try_build()?;

    let result = match cli_args.cmd {
        Command::Resolve { packages, output } => provenant
            .resolve_packages(&packages, &output)
            .await
            .map(|report| {
                let unresolved = report.packages.len() - report.resolved_count();
                if unresolved > 0 {
                    warn!("{} packages have no resolvable provenance", unresolved);
                }
            }),
        Command::Show { id } => provenant.show(&id),
        Command::Forget { id } => provenant.forget(&id).map(|_| ()),
        Command::ClearCache => provenant.clear_cache(),
    };

    provenant.shutdown();
    result
}
