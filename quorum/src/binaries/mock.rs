//! Serves the in-process mock threshold engine over HTTP.
//!
//! NON PRODUCTION: the engine holds every participant's secret.

use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use quorum_types::ParticipantId;
use quorum_utils::logging::init_logging_with;
use quorum_utils::mock::{MockEngine, MockServer};
use tokio::signal::ctrl_c;
use tracing::info;

#[derive(Parser, Debug)]
struct Cli {
    #[clap(long, short, default_value_t = 8080)]
    port: u16,

    /// Committee size.
    #[clap(long, short, default_value_t = 4)]
    size: usize,

    /// Base58 encoded 32 byte seed to derive keys from.
    #[clap(long)]
    seed: Option<String>,

    /// Participants producing corrupt shares.
    #[clap(long, value_delimiter = ',')]
    faulty: Vec<u64>,

    /// Participants that never answer share requests.
    #[clap(long, value_delimiter = ',')]
    silent: Vec<u64>,

    /// Write `{id}-pk` public key files to this directory.
    #[clap(long)]
    write_keys: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging_with("info");

    let cli = Cli::parse();

    let seed = match &cli.seed {
        Some(s) => bs58::decode(s)
            .into_vec()?
            .try_into()
            .map_err(|_| anyhow!("seed must be 32 bytes"))?,
        None => [0; 32],
    };

    let engine = MockEngine::with_seed(seed, cli.size)
        .with_faulty(cli.faulty.into_iter().map(ParticipantId::new))
        .with_silent(cli.silent.into_iter().map(ParticipantId::new));

    if let Some(dir) = &cli.write_keys {
        fs::create_dir_all(dir).with_context(|| format!("creating {dir:?}"))?;
        for id in (0..cli.size as u64).map(ParticipantId::new) {
            let key = engine.public_key(id, cli.size)?;
            fs::write(dir.join(format!("{id}-pk")), key.as_bytes())?;
        }
        info!(dir = ?dir, size = %cli.size, "public keys written");
    }

    let server = MockServer::new(Arc::new(engine));

    info!(port = %cli.port, size = %cli.size, "serving mock engine");

    tokio::select! {
        r = server.serve((Ipv4Addr::UNSPECIFIED, cli.port)) => r?,
        _ = ctrl_c() => info!("received ctrl-c, shutting down")
    }

    Ok(())
}
