//! NameChain miner binary.
//!
//! Reads the current tip as a block line, mines the next block and prints
//! it as a block line, so it can sit between a tip fetcher and a submitter:
//!
//!   fetch-tip | namechain-mine mine --name Dominik --target 6 | submit-block

use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use namechain_core::{Block, Difficulty, ParseLimits};
use namechain_miner::{
    format_hash_rate, CancelToken, MinedBlock, Miner, MinerConfig, MiningError, NoProgress,
};
use serde::Serialize;

/// NameChain CPU miner
#[derive(Debug, Parser)]
#[command(name = "namechain-mine", version)]
#[command(about = "Proof-of-work miner for NameChain blocks")]
struct Cli {
    /// Maximum accepted length of an input block line (0 = no limit).
    /// Values below 66 also lower the minimum to match.
    #[arg(long, global = true, default_value_t = 100)]
    max_line_len: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mine a block on top of a tip block
    Mine(MineArgs),
    /// Print the digest of a block line
    Hash {
        /// Block line `<previous> <name> <nonce>`
        line: String,
    },
    /// Check that a block line meets a difficulty
    Verify {
        /// Block line `<previous> <name> <nonce>`
        line: String,

        /// Required leading zero hex digits
        #[arg(long, short = 't')]
        target: u32,
    },
}

#[derive(Debug, Args)]
struct MineArgs {
    /// Name to record in the block
    #[arg(long, short = 'n')]
    name: String,

    /// Required leading zero hex digits
    #[arg(long, short = 't', default_value_t = 4)]
    target: u32,

    /// Tip block line; read from the first line of stdin when omitted
    #[arg(long)]
    tip: Option<String>,

    /// Number of worker threads (0 = one per CPU)
    #[arg(long, short = 'w', default_value_t = 0)]
    workers: usize,

    /// Nonces handed to a worker at a time
    #[arg(long, default_value_t = namechain_miner::DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Print a JSON summary instead of the bare block line
    #[arg(long)]
    json: bool,

    /// Suppress per-chunk progress logging
    #[arg(long)]
    quiet: bool,
}

/// Summary printed with `--json`.
#[derive(Debug, Serialize)]
struct MineReport<'a> {
    block: &'a Block,
    digest: String,
    worker: usize,
    hashes: u64,
    elapsed_ms: u128,
    hash_rate: String,
}

impl<'a> From<&'a MinedBlock> for MineReport<'a> {
    fn from(mined: &'a MinedBlock) -> Self {
        MineReport {
            block: &mined.block,
            digest: mined.digest.to_hex(),
            worker: mined.worker,
            hashes: mined.hashes,
            elapsed_ms: mined.elapsed.as_millis(),
            hash_rate: format_hash_rate(mined.hashrate()),
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let stop = CancelToken::new();
    let handler_stop = stop.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_stop.cancel()) {
        warn!(target: "namechain::mine", "failed to install Ctrl-C handler: {}", err);
    }

    match run(cli, &stop) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, stop: &CancelToken) -> Result<ExitCode> {
    let limits = parse_limits(cli.max_line_len);
    limits.validate()?;

    match cli.command {
        Command::Mine(args) => mine(args, &limits, stop),
        Command::Hash { line } => {
            let block = Block::parse_with(&line, &limits).context("invalid block line")?;
            println!("{}", block.digest());
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify { line, target } => {
            let block = Block::parse_with(&line, &limits).context("invalid block line")?;
            let difficulty = Difficulty::new(target)?;
            let digest = block.digest();
            if difficulty.is_met_by(&digest) {
                println!("ok {}", digest);
                Ok(ExitCode::SUCCESS)
            } else {
                println!("insufficient work {}", digest);
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn parse_limits(max_line_len: usize) -> ParseLimits {
    if max_line_len == 0 {
        ParseLimits::unbounded()
    } else {
        ParseLimits::with_max_len(max_line_len)
    }
}

fn mine(args: MineArgs, limits: &ParseLimits, stop: &CancelToken) -> Result<ExitCode> {
    let tip_line = match args.tip {
        Some(line) => line,
        None => read_tip_line()?,
    };
    let tip = Block::parse_with(&tip_line, limits).context("invalid tip block")?;
    let template = Block::next_after(&tip, args.name)?;
    let difficulty = Difficulty::new(args.target)?;

    let workers = if args.workers == 0 {
        num_cpus::get()
    } else {
        args.workers
    };
    let mut miner = Miner::new(MinerConfig::with_workers(workers).chunk_size(args.chunk_size))?;
    if args.quiet {
        miner = miner.with_progress(Arc::new(NoProgress));
    }

    info!(target: "namechain::mine", "tip {} -> mining {:?}", tip.digest(), template.name);

    let mined = match miner.mine_until(&template, difficulty, stop) {
        Ok(mined) => mined,
        Err(MiningError::Cancelled) => {
            warn!(target: "namechain::mine", "interrupted before a block was found");
            return Ok(ExitCode::from(130));
        }
        Err(err) => return Err(err.into()),
    };

    if !mined.block.meets(difficulty) {
        bail!("mined block {} does not meet difficulty {}", mined.block, difficulty);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&MineReport::from(&mined))?);
    } else {
        println!("{}", mined.block);
    }
    info!(
        target: "namechain::mine",
        "mined in {:.2?} at {}",
        mined.elapsed,
        format_hash_rate(mined.hashrate())
    );
    Ok(ExitCode::SUCCESS)
}

fn read_tip_line() -> Result<String> {
    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read tip block from stdin")?;
    if read == 0 {
        bail!("no tip block given: pass --tip or pipe a block line on stdin");
    }
    Ok(line)
}
