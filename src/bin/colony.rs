//! Colony command-line tool
//!
//! Operates on one pool file, creating it when it does not exist yet.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colony_rs::{Colony, ElementKind, Item, ObjectRef, Pool, PoolConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "colony")]
#[command(about = "Create, fill and inspect colonies stored in a pool file")]
struct Args {
    /// Pool file (created when absent)
    pool: PathBuf,

    /// Pool configuration (TOML), applied when the pool is created
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty colony
    CreateColony {
        name: String,
        /// Element kind: int or ref
        #[arg(value_parser = parse_kind)]
        kind: ElementKind,
        block_capacity: u64,
    },

    /// Insert one integer
    InsertInt {
        name: String,
        #[arg(allow_hyphen_values = true)]
        value: i32,
    },

    /// Insert one object reference
    #[command(alias = "insert-PMEMoid")]
    InsertRef {
        name: String,
        pool_uuid_lo: u64,
        off: u64,
    },

    /// Insert whitespace-separated integers read from a file
    InsertIntFromFile { name: String, file: PathBuf },

    /// Insert whitespace-separated `uuid off` pairs read from a file
    #[command(alias = "insert-PMEMoid-from-file")]
    InsertRefFromFile { name: String, file: PathBuf },

    /// Remove the element at an index
    RemoveItem { name: String, index: u64 },

    /// Remove every element with an index in FROM..=TO
    RemoveRange { name: String, from: u64, to: u64 },

    /// Print the colony counters
    PrintContent {
        name: String,
        #[arg(long)]
        json: bool,
    },

    /// Print every element with its index
    PrintColony {
        name: String,
        #[arg(long)]
        json: bool,
    },

    /// Release the blocks that hold no elements
    DeleteFreeBlocks { name: String },

    /// Delete a colony and everything in it
    DeleteColony { name: String },

    /// List the colonies in the pool
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct Entry {
    index: u64,
    item: Item,
}

fn parse_kind(s: &str) -> Result<ElementKind, String> {
    s.parse::<ElementKind>().map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PoolConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PoolConfig::default(),
    };

    let mut pool = Pool::open_or_create(&args.pool, &config)
        .with_context(|| format!("opening pool {}", args.pool.display()))?;

    run(&mut pool, args.command)?;
    pool.close().context("closing pool")
}

fn run(pool: &mut Pool, command: Command) -> Result<()> {
    match command {
        Command::CreateColony {
            name,
            kind,
            block_capacity,
        } => {
            Colony::create(pool, &name, kind, block_capacity)
                .with_context(|| format!("creating colony {}", name))?;
        }

        Command::InsertInt { name, value } => {
            let colony = open(pool, &name)?;
            let idx = colony.insert(pool, value)?;
            println!("{}", idx);
        }

        Command::InsertRef {
            name,
            pool_uuid_lo,
            off,
        } => {
            let colony = open(pool, &name)?;
            let idx = colony.insert(pool, ObjectRef::new(pool_uuid_lo, off))?;
            println!("{}", idx);
        }

        Command::InsertIntFromFile { name, file } => {
            let colony = open(pool, &name)?;
            let mut inserted = 0;
            for token in read_tokens(&file)?.split_whitespace() {
                let Ok(value) = token.parse::<i32>() else {
                    warn!("Stopping at non-integer token {:?}", token);
                    break;
                };
                colony.insert(pool, value)?;
                inserted += 1;
            }
            info!("Inserted {} items into {}", inserted, name);
        }

        Command::InsertRefFromFile { name, file } => {
            let colony = open(pool, &name)?;
            let text = read_tokens(&file)?;
            let tokens: Vec<&str> = text.split_whitespace().collect();
            let mut inserted = 0;
            for pair in tokens.chunks(2) {
                let parsed = match pair {
                    [uuid, off] => uuid.parse::<u64>().ok().zip(off.parse::<u64>().ok()),
                    _ => None,
                };
                let Some((uuid, off)) = parsed else {
                    warn!("Stopping at malformed reference {:?}", pair);
                    break;
                };
                colony.insert(pool, ObjectRef::new(uuid, off))?;
                inserted += 1;
            }
            info!("Inserted {} items into {}", inserted, name);
        }

        Command::RemoveItem { name, index } => {
            open(pool, &name)?.remove(pool, index)?;
        }

        Command::RemoveRange { name, from, to } => {
            let removed = open(pool, &name)?.remove_range(pool, from, to)?;
            println!("{}", removed);
        }

        Command::PrintContent { name, json } => {
            let stats = open(pool, &name)?.stats(&*pool)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", stats);
            }
        }

        Command::PrintColony { name, json } => {
            let entries = open(pool, &name)?.entries(&*pool)?;
            if json {
                let entries: Vec<Entry> = entries
                    .into_iter()
                    .map(|(index, item)| Entry { index, item })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for (index, item) in entries {
                    println!("col_idx: {}\t\t{}", index, item);
                }
            }
        }

        Command::DeleteFreeBlocks { name } => {
            let released = open(pool, &name)?.delete_free_blocks(pool)?;
            println!("{}", released);
        }

        Command::DeleteColony { name } => {
            open(pool, &name)?.delete(pool)?;
        }

        Command::List { json } => {
            let colonies = Colony::list(&*pool)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&colonies)?);
            } else {
                for stats in colonies {
                    println!(
                        "{}\t{}\tsize {}\tcapacity {}",
                        stats.name, stats.kind, stats.colony_size, stats.colony_capacity
                    );
                }
            }
        }
    }

    Ok(())
}

fn open(pool: &Pool, name: &str) -> Result<Colony> {
    Colony::open(pool, name).with_context(|| format!("{} doesn't exist", name))
}

fn read_tokens(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to open file {}", path.display()))
}
