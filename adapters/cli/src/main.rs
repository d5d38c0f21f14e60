#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that hosts a headless Duel Defence match.

mod config;
mod session;
mod transport;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;

use crate::{config::MatchConfig, session::Match};

/// Runs a two-participant match in-process and reports the outcome.
#[derive(Debug, Parser)]
#[command(name = "duel-defence", version, about)]
struct Args {
    /// Match configuration file; the built-in match is played when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Overrides the seed from the configuration.
    #[arg(short, long)]
    seed: Option<u64>,
    /// Simulated seconds after which the match is called on lives.
    #[arg(long, default_value_t = 600)]
    max_seconds: u64,
}

/// Entry point for the Duel Defence command-line interface.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = MatchConfig::load(args.config.as_deref())?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let outcome = Match::new(&config)?.run(Duration::from_secs(args.max_seconds))?;
    println!("{outcome}");
    Ok(())
}
