//! Runs threshold decryption rounds against a remote service.
//!
//! Every round encrypts the given message under the committee's keys, has
//! it partially decrypted by the participants and combined again, and
//! checks that the message comes back unchanged.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use quorum_client::Client;
use quorum_coordinator::{Coordinator, KeyDirectory};
use quorum_types::ParticipantId;
use quorum_utils::config::CoordinatorConfig;
use quorum_utils::logging::init_logging_with;
use tracing::info;

#[derive(Parser, Debug)]
struct Cli {
    /// Path to the coordinator configuration file.
    #[clap(long, short)]
    config: PathBuf,

    /// The message to encrypt and recover.
    #[clap(long, short, default_value = "Hello, world!")]
    message: String,

    /// How many rounds to run.
    #[clap(long, short, default_value_t = 1)]
    rounds: usize,

    /// Do not verify partial shares before combining them.
    #[clap(long, default_value_t = false)]
    no_verify: bool,

    /// Participants to ask for shares (comma separated ids).
    #[clap(long, value_delimiter = ',')]
    participants: Option<Vec<u64>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging_with("info");

    let cli = Cli::parse();

    let mut config = CoordinatorConfig::read(&cli.config)
        .with_context(|| format!("reading config at {:?}", cli.config))?;

    if cli.no_verify {
        config.round.verify = false
    }
    if let Some(ps) = cli.participants {
        config.round.candidates = Some(ps.into_iter().map(ParticipantId::new).collect())
    }

    let client = Arc::new(Client::new(config.client_config("coordinator")));

    let mut dir = KeyDirectory::new(client.clone(), config.size).with_keys(config.public_keys());
    if let Some(path) = &config.round.keys_dir {
        dir = dir
            .with_key_dir(path)
            .with_context(|| format!("loading keys from {path:?}"))?;
    }
    info!(keys = %dir.len(), size = %config.size, "key directory ready");

    let round = config
        .round_config("coordinator")
        .context("invalid round configuration")?;
    let coordinator = Coordinator::with_directory(round, client, Arc::new(dir))?;

    for _ in 0..cli.rounds {
        let report = coordinator.run(cli.message.as_bytes()).await?;
        for (state, elapsed) in &report.timings {
            println!("{state:?}: {elapsed:?}")
        }
        println!(
            "round {}: {:?} recovered from {:?} in {:?}",
            report.round,
            String::from_utf8_lossy(&report.plaintext),
            report.contributors,
            report.elapsed()
        );
    }

    Ok(())
}
