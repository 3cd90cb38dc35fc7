//! Kestrel Meta - extended attribute metadata tool
//!
//! Inspects and edits the metadata a storage node keeps in the extended
//! attributes of a data file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kestrel_common::Config;
use kestrel_storage::{AttrKey, MetadataMap, MetadataStore, XattrError, xattr};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kestrel-meta")]
#[command(about = "Kestrel xattr metadata tool")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/kestrel/kestrel.toml")]
    config: String,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the raw value of one attribute
    Get { path: PathBuf, key: String },
    /// Set one attribute
    Set {
        path: PathBuf,
        key: String,
        value: String,
    },
    /// Remove one attribute
    Rm { path: PathBuf, key: String },
    /// List attribute names
    List { path: PathBuf },
    /// Print the decoded metadata map as JSON
    Dump { path: PathBuf },
    /// Replace the metadata map with a JSON object (`-` reads stdin)
    PutMap { path: PathBuf, json: String },
}

fn open(path: &Path, write: bool) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(write)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

/// Name the filesystem as the culprit when it lacks xattr support
fn explain(path: &Path, err: XattrError) -> anyhow::Error {
    if err.is_unsupported() {
        anyhow::Error::new(err).context(format!(
            "{} is on a filesystem without extended attribute support",
            path.display()
        ))
    } else {
        err.into()
    }
}

/// Parse a JSON object of string values
fn parse_map(json: &str) -> Result<MetadataMap> {
    serde_json::from_str(json).context("metadata must be a JSON object of strings")
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(&args.config)?;
    let store = MetadataStore::new(&config.metadata)?;
    debug!("Metadata key: {}", store.metadata_key());

    match args.command {
        Commands::Get { path, key } => {
            let file = open(&path, false)?;
            let value = store
                .read_metadata(&file, &AttrKey::new(key)?)
                .map_err(|e| explain(&path, e))?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&value)?;
            stdout.write_all(b"\n")?;
        }
        Commands::Set { path, key, value } => {
            anyhow::ensure!(!value.is_empty(), "value must not be empty");
            let file = open(&path, true)?;
            store
                .write_metadata(&file, &AttrKey::new(key)?, value.as_bytes())
                .map_err(|e| explain(&path, e))?;
        }
        Commands::Rm { path, key } => {
            let file = open(&path, true)?;
            xattr::remove(&file, &AttrKey::new(key)?).map_err(|e| explain(&path, e))?;
        }
        Commands::List { path } => {
            let file = open(&path, false)?;
            for name in xattr::list(&file).map_err(|e| explain(&path, e))? {
                println!("{name}");
            }
        }
        Commands::Dump { path } => {
            let file = open(&path, false)?;
            let map = store.read_map(&file).map_err(|e| explain(&path, e))?;
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        Commands::PutMap { path, json } => {
            let json = if json == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                json
            };
            let map = parse_map(&json)?;
            let file = open(&path, true)?;
            store
                .write_map(&file, &map)
                .map_err(|e| explain(&path, e))?;
            println!("Wrote {} key(s) to {}", map.len(), path.display());
        }
    }

    Ok(())
}
