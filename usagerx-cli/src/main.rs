//! ## usagerx-cli
//! `usagerx` binary: runs the usage receiver, or sends a single usage packet
//! to smoke-test one.

use clap::Parser;

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(run_args) => commands::run_receiver(run_args).await,
        Commands::Send(send_args) => commands::send_packet(send_args),
    }
}
