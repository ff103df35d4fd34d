// Copyright 2026 The vrboot Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod boot;
mod bootstrap;
mod cli;
mod network;
mod readiness;
mod synth;
mod util;
mod vyos;

use anyhow::{Context, Result};
use slog::{o, Drain};
use slog_scope::{debug, error, warn};
use std::fs::{self, OpenOptions};
use std::path::Path;

/// Persistent log, kept next to the cached bootstrap info.
const LOG_FILE: &str = "/home/vyos/zvr/zvrboot.log";

fn main() {
    let status = {
        let (log, log_err) = build_logger(Path::new(LOG_FILE));
        let _guard = slog_scope::set_global_logger(log);

        debug!("Logging initialized");
        if let Some(e) = log_err {
            warn!("logging to terminal only: {:#}", e);
        }

        match run() {
            Ok(()) => 0,
            Err(e) => {
                error!("{:?}", e);
                1
            }
        }
        // Dropping the guard flushes the async drain before exiting.
    };
    std::process::exit(status);
}

fn run() -> Result<()> {
    let args = std::env::args();
    let cli_cfg = cli::parse_args(args).context("failed to parse command-line arguments")?;
    cli_cfg.run()
}

/// Terminal logger, duplicated into `log_file` when it can be opened.
///
/// Trace-level logs are gated at compile-time by `max_level_trace` and
/// `release_max_level_info` feature flags.
fn build_logger(log_file: &Path) -> (slog::Logger, Option<anyhow::Error>) {
    let decorator = slog_term::TermDecorator::new().build();
    let term = slog_term::FullFormat::new(decorator).build().fuse();

    match open_log_file(log_file) {
        Ok(file) => {
            let decorator = slog_term::PlainSyncDecorator::new(file);
            let file = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog::Duplicate::new(term, file).ignore_res();
            let drain = slog_async::Async::new(drain).build().fuse();
            (slog::Logger::root(drain, o!()), None)
        }
        Err(e) => {
            let drain = slog_async::Async::new(term).build().fuse();
            (slog::Logger::root(drain, o!()), Some(e))
        }
    }
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file '{}'", path.display()))
}
