//! Feedview command-line entry point.

use std::path::PathBuf;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use feedview::{Config, Error, FeedIndex, ReadOptions, Result, Topic, load_config};

#[derive(Parser, Debug)]
#[command(name = "feedview")]
#[command(about = "Live materialized views over an append-only feed")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "FEEDVIEW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append a file of JSON lines to the feed and index it
    Ingest {
        /// One feed entry per line
        file: PathBuf,
    },

    /// Print readings of a channel, newest first
    Read {
        channel: String,

        /// Only readings after this timestamp (ms)
        #[arg(long)]
        after: Option<f64>,

        /// Only readings before this timestamp (ms)
        #[arg(long)]
        before: Option<f64>,

        #[arg(short, long)]
        limit: Option<usize>,

        /// Oldest first
        #[arg(long)]
        forward: bool,
    },

    /// Print the latest readings of a channel grouped by field and device
    Series {
        channel: String,

        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// List every known channel
    Channels,

    /// Drop all views and re-index the feed
    Rebuild,

    /// Follow new readings until interrupted
    Tail {
        /// Only readings of this channel
        channel: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "feedview failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let index = FeedIndex::open(config).await?;
    let index = match cli.command {
        Command::Ingest { file } => {
            ingest(&index, file).await?;
            index
        }
        Command::Read {
            channel,
            after,
            before,
            limit,
            forward,
        } => {
            index.sync().await?;
            let options = ReadOptions {
                after,
                before,
                limit,
                reverse: !forward,
            };
            let mut readings = index.readings().read(&channel, options).await?;
            while let Some(reading) = readings.next().await? {
                print_json(&reading)?;
            }
            index
        }
        Command::Series { channel, limit } => {
            index.sync().await?;
            let series = index
                .readings()
                .series(&channel, ReadOptions::latest(limit))
                .await?;
            print_json(&series)?;
            index
        }
        Command::Channels => {
            index.sync().await?;
            for name in index.channels().list().await? {
                println!("{}", name);
            }
            index
        }
        Command::Rebuild => {
            let index = index.rebuild().await?;
            index.sync().await?;
            report(&index);
            index
        }
        Command::Tail { channel } => {
            tail(&index, channel).await?;
            index
        }
    };
    index.close().await
}

async fn ingest(index: &FeedIndex, file: PathBuf) -> Result<()> {
    let contents = tokio::fs::read_to_string(&file).await.map_err(|e| {
        Error::InvalidInput(format!("failed to read {}: {}", file.display(), e))
    })?;
    let values: Vec<Bytes> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Bytes::copy_from_slice(line.as_bytes()))
        .collect();
    let appended = index.append(values).await?;
    tracing::info!(from = appended.start, to = appended.end, "appended entries");
    index.wait_indexed(appended.end).await?;
    report(index);
    Ok(())
}

async fn tail(index: &FeedIndex, channel: Option<String>) -> Result<()> {
    let topic = match channel {
        Some(name) => Topic::Channel(name),
        None => Topic::Global,
    };
    let mut readings = index.readings().subscribe(topic);
    let mut added = index.channels().subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            Some(name) = added.recv() => tracing::info!(channel = %name, "new channel"),
            reading = readings.recv() => match reading {
                Some(reading) => print_json(&reading)?,
                None => return Ok(()),
            },
        }
    }
}

fn report(index: &FeedIndex) {
    for (view, status, checkpoint) in index.statuses() {
        tracing::info!(view = %view, ?status, checkpoint, "view status");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("failed to encode output: {}", e)))?;
    println!("{}", line);
    Ok(())
}
