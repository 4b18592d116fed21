mod cli;
mod config;
mod machine;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use qemu_machine::Driver;

use crate::cli::{Cli, Commands};
use crate::config::machine_dir;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v/-q
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.verbose.tracing_level_filter().to_string())),
        )
        .with_writer(std::io::stderr)
        .init();

    let storage = cli.storage_path.as_deref();

    match cli.command {
        Commands::Create { name, flags } => {
            machine::create(&machine_dir(storage, &name), &name, &flags)
        }
        Commands::Start { name } => machine::start(&machine_dir(storage, &name)),
        Commands::Stop { name } => machine::unsupported(&machine_dir(storage, &name), Driver::stop),
        Commands::Restart { name } => {
            machine::unsupported(&machine_dir(storage, &name), Driver::restart)
        }
        Commands::Kill { name } => machine::unsupported(&machine_dir(storage, &name), Driver::kill),
        Commands::Upgrade { name } => {
            machine::unsupported(&machine_dir(storage, &name), Driver::upgrade)
        }
        Commands::Rm { name } => machine::remove(&machine_dir(storage, &name)),
        Commands::Ip { name } => machine::ip(&machine_dir(storage, &name)),
        Commands::Url { name } => machine::url(&machine_dir(storage, &name)),
        Commands::Status { name } => machine::status(&machine_dir(storage, &name)),
        Commands::Inspect { name } => machine::inspect(&machine_dir(storage, &name)),
    }
}
