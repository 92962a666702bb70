//
// main.rs
//
// Copyright (C) 2024-2025 Posit Software, PBC. All rights reserved.
//
//

//! Main binary entry point for the JavaScript kernel.

#![allow(missing_docs)]

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{command, Parser};
use ijkernel::connection_file::ConnectionFile;
use ijkernel::execution_session::process::ProcessEngineLauncher;
use ijkernel::kernel::Kernel;
use ijkernel::kernel_config::{expand_path, KernelConfig};
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode, WriteLogger};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The path to the Jupyter connection file naming the sockets to bind
    connection_file: PathBuf,

    /// Enable debug logging (overrides --log-level)
    #[arg(long)]
    debug: bool,

    /// Don't broadcast results that are just `undefined`
    #[arg(long, conflicts_with = "show_undefined")]
    hide_undefined: bool,

    /// Broadcast results that are just `undefined` (the default)
    #[arg(long)]
    show_undefined: bool,

    /// The Jupyter protocol version to speak, e.g. "5.0" or "4.1"
    #[arg(long, default_value = "5.0")]
    protocol: String,

    /// The working directory of the execution engine
    #[arg(long)]
    session_working_dir: Option<PathBuf>,

    /// A script to run whenever the engine starts, or a directory of `.js`
    /// scripts to run in file-name order
    #[arg(long)]
    startup_script: Option<PathBuf>,

    /// The program that runs the execution engine
    #[arg(long, env = "IJKERNEL_ENGINE")]
    engine: String,

    /// An argument to pass to the engine program; may be repeated
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// The language version to report in kernel_info replies
    #[arg(long, default_value = "")]
    language_version: String,

    /// The path to a log file. If specified, log output will be written to this
    /// file in addition to standard streams.
    #[arg(long)]
    log_file: Option<String>,

    /// The log level to use. Valid values are "trace", "debug", "info", "warn",
    /// and "error". If not specified, the default log level is "info", or the
    /// value of `RUST_LOG` if set.
    #[arg(short, long)]
    log_level: Option<String>,
}

fn log_level(args: &Args) -> LevelFilter {
    if args.debug {
        return LevelFilter::Debug;
    }

    // Command line first, then RUST_LOG, then "info"
    let log_level = match args.log_level {
        Some(ref level) => level.to_string(),
        None => std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
    };

    match log_level.as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            println!("Invalid log level '{}'; using 'info'", log_level);
            LevelFilter::Info
        }
    }
}

fn init_logging(args: &Args) -> Result<(), anyhow::Error> {
    let log_level = log_level(args);
    match args.log_file {
        Some(ref log_file) => {
            // Write to the log file and the terminal
            CombinedLogger::init(vec![
                TermLogger::new(
                    log_level,
                    Config::default(),
                    TerminalMode::Mixed,
                    ColorChoice::Auto,
                ),
                WriteLogger::new(log_level, Config::default(), File::create(log_file)?),
            ])?;
        }
        None => {
            TermLogger::init(
                log_level,
                Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            )?;
        }
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), anyhow::Error> {
    let connection_file = ConnectionFile::from_file(&args.connection_file).map_err(|err| {
        anyhow::anyhow!(
            "Failed to read connection file {}: {}",
            args.connection_file.display(),
            err
        )
    })?;

    let config = KernelConfig {
        protocol_version: args.protocol,
        hide_undefined: args.hide_undefined,
        language_version: args.language_version,
        startup_script: args.startup_script,
    };
    let launcher = ProcessEngineLauncher::new(args.engine, args.engine_args)
        .with_working_dir(args.session_working_dir.as_deref().map(expand_path));

    let kernel = Kernel::new(&connection_file, config, Arc::new(launcher)).await?;
    log::debug!("Starting kernel session {}", kernel.session_id());
    kernel.serve().await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Consider it a fatal error if we can't initialize logging
    if let Err(err) = init_logging(&args) {
        println!("Failed to initialize logging: {}", err);
        std::process::exit(1);
    }

    if let Err(err) = run(args).await {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
    log::info!("Kernel exited");
}
