//! mbdd - multi-buffer dd.
//!
//! Copies standard input through a ring of staging buffers to one or
//! more destinations; each destination drains at its own pace and the
//! slowest one throttles the reader.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use iotools::copy::{ self, CopyConfig, Sink };
use iotools::size::{ getnum, SUFFIX_HELP };
use iotools::{ stdio, AbortFlag };

fn size_value(s: &str) -> Result<u64, std::convert::Infallible> {
    Ok(getnum(s))
}

#[derive(Parser, Debug)]
#[command(name = "mbdd", version, about = "Multi-buffer dd", after_help = SUFFIX_HELP)]
struct Args {
    /// Buffer size
    #[arg(short = 'b', value_name = "bytes", value_parser = size_value, default_value = "64k")]
    buf_size: u64,

    /// Number of full buffers to copy (zero for until EOF)
    #[arg(short = 'c', value_name = "count", value_parser = size_value, default_value = "0")]
    count: u64,

    /// Number of buffers
    #[arg(short = 'n', value_name = "number", value_parser = size_value, default_value = "16")]
    num_bufs: u64,

    /// Quiet operation
    #[arg(short = 'q')]
    quiet: bool,

    /// Suppress the default stdout destination
    #[arg(short = 's')]
    no_stdout: bool,

    /// Display progress line
    #[arg(short = 'v')]
    verbose: bool,

    /// Additional destination files (created or truncated)
    #[arg(value_name = "dest")]
    dests: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber
        ::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    match run(Args::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let abort = AbortFlag::new();
    abort.install_sigint_handler();

    // claim both standard streams before anything else can buffer them
    let input = stdio::claim_stdin().context("claiming stdin")?;
    let mut sinks = Vec::new();
    if !args.no_stdout {
        sinks.push(Sink {
            name: "stdout".into(),
            file: stdio::claim_stdout().context("claiming stdout")?,
        });
    }
    for dest in &args.dests {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(dest)
            .with_context(|| format!("opening destination '{}'", dest.display()))?;
        sinks.push(Sink {
            name: dest.display().to_string(),
            file,
        });
    }

    let config = CopyConfig {
        buf_size: args.buf_size,
        num_bufs: args.num_bufs as usize,
        max_blocks: args.count,
        quiet: args.quiet,
        verbose: args.verbose,
    };
    let summary = copy::run(&config, input, sinks, abort)?;
    if summary.aborted {
        eprintln!("Transfer aborted.");
    }
    if !config.quiet {
        eprintln!("{}", summary.report());
    }
    Ok(if summary.error.is_some() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
