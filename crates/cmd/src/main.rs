// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use snafu::{ResultExt, Whatever};
use telespool_common_telemetry::{init_global_logging, set_panic_hook};
use telespool_queue::{
    DrainConfig, Drainer, FileQueue, QueueBuilder, QueueConfig, RawCodec, StagedRecord,
    TransmitError, Transmitter,
};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod config;
use config::SpoolConfig;

#[derive(Debug, Parser)]
#[clap(
name = "telespool",
about = "Inspect, fill and drain telespool staging directories",
author = env!("CARGO_PKG_AUTHORS"),
version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// TOML file with `[queue]` and `[logging]` tables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Status(StatusArgs),
    Stage(StageArgs),
    Drain(DrainArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print the number of staged records in a directory.
Examples:

telespool status /var/spool/traces

")]
struct StatusArgs {
    dir: PathBuf,
}

impl StatusArgs {
    async fn run(&self, config: QueueConfig) -> Result<(), Whatever> {
        let queue = open_queue(&self.dir, config)?;
        let pending = queue
            .pending_count()
            .await
            .whatever_context("failed to list staged files")?;
        println!("{pending}");
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Stage one raw record under KEY. The payload is read from FILE, or from stdin
when FILE is omitted.
Examples:

telespool stage /var/spool/traces batch-0001 ./batch.bin
echo 'hello' | telespool stage /var/spool/traces greeting

")]
struct StageArgs {
    dir:  PathBuf,
    key:  String,
    file: Option<PathBuf>,
}

impl StageArgs {
    async fn run(&self, config: QueueConfig) -> Result<(), Whatever> {
        let payload = match &self.file {
            Some(file) => tokio::fs::read(file)
                .await
                .with_whatever_context(|_| format!("failed to read {}", file.display()))?,
            None => {
                let mut buf = Vec::new();
                tokio::io::stdin()
                    .read_to_end(&mut buf)
                    .await
                    .whatever_context("failed to read stdin")?;
                buf
            }
        };

        let queue = open_queue(&self.dir, config)?;
        let bytes = payload.len();
        queue
            .enqueue(
                &[StagedRecord::new(self.key.as_str(), payload)],
                &CancellationToken::new(),
            )
            .await
            .with_whatever_context(|_| format!("failed to stage {}", self.key))?;
        info!(key = %self.key, bytes, "Record staged");
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Take staged records out of a directory and print one JSON line per record
with its key and size. Records are deleted as they are printed.
Without --follow, stops when the directory is empty or after --max-batches.
With --follow, keeps draining every --interval-ms until Ctrl-C.
Examples:

telespool drain /var/spool/traces
telespool drain /var/spool/traces --max-batches 1
telespool drain /var/spool/traces --follow

")]
struct DrainArgs {
    dir: PathBuf,

    /// Stop after this many batches.
    #[arg(long)]
    max_batches: Option<usize>,

    /// Keep draining until interrupted.
    #[arg(long)]
    follow: bool,

    /// Poll interval for --follow.
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

impl DrainArgs {
    async fn run(&self, config: QueueConfig) -> Result<(), Whatever> {
        let queue = open_queue(&self.dir, config)?;
        let cancel = CancellationToken::new();

        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping");
                ctrl_c.cancel();
            }
        });

        if self.follow {
            return self.run_follow(queue, cancel).await;
        }

        let mut drained = 0;
        let mut batches = 0;
        while self.max_batches.is_none_or(|max| batches < max) {
            let batch = queue
                .dequeue_batch(&cancel)
                .await
                .whatever_context("failed to dequeue")?;
            if batch.is_empty() {
                break;
            }
            batches += 1;
            drained += batch.len();
            print_records(&batch).whatever_context("failed to write to stdout")?;
        }
        info!(drained, batches, "Drain finished");
        Ok(())
    }

    async fn run_follow(
        &self,
        queue: FileQueue<StagedRecord, RawCodec>,
        cancel: CancellationToken,
    ) -> Result<(), Whatever> {
        let drain_config = DrainConfig::builder()
            .interval(Duration::from_millis(self.interval_ms))
            .maybe_max_batches_per_pass(self.max_batches)
            .build();
        let drainer = Drainer::new(Arc::new(queue), StdoutTransmitter, drain_config);
        drainer
            .run(cancel)
            .await
            .whatever_context("drainer stopped")
    }
}

/// Prints every batch it receives; a closed stdout stops the drainer.
struct StdoutTransmitter;

#[async_trait::async_trait]
impl Transmitter<StagedRecord> for StdoutTransmitter {
    async fn transmit(&self, batch: Vec<StagedRecord>) -> Result<(), TransmitError> {
        print_records(&batch).map_err(|e| TransmitError::fatal(format!("stdout: {e}")))
    }
}

#[derive(Serialize)]
struct DrainedLine<'a> {
    key:   &'a str,
    bytes: usize,
}

fn print_records(batch: &[StagedRecord]) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    for record in batch {
        serde_json::to_writer(
            &mut out,
            &DrainedLine {
                key:   &record.key,
                bytes: record.payload.len(),
            },
        )?;
        writeln!(out)?;
    }
    out.flush()
}

fn open_queue(
    dir: &Path,
    config: QueueConfig,
) -> Result<FileQueue<StagedRecord, RawCodec>, Whatever> {
    QueueBuilder::from_config(QueueConfig {
        storage_path: dir.to_path_buf(),
        ..config
    })
    .build(RawCodec)
    .with_whatever_context(|_| format!("failed to open queue at {}", dir.display()))
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SpoolConfig::load(path)?,
        None => SpoolConfig::default(),
    };

    let _guards = init_global_logging("telespool", &config.logging);
    set_panic_hook();

    match cli.commands {
        Commands::Status(args) => args.run(config.queue).await,
        Commands::Stage(args) => args.run(config.queue).await,
        Commands::Drain(args) => args.run(config.queue).await,
    }
}
