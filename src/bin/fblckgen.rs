//! fblckgen - fast block generator.
//!
//! Writes blocks of repeating ASCII or pseudo-random data to standard
//! output, double-buffered so generation and I/O overlap.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use iotools::blockgen::{ self, GenConfig };
use iotools::fill::FillMode;
use iotools::size::{ getnum, SUFFIX_HELP };
use iotools::{ stdio, AbortFlag };

fn size_value(s: &str) -> Result<u64, std::convert::Infallible> {
    Ok(getnum(s))
}

#[derive(Parser, Debug)]
#[command(
    name = "fblckgen",
    version,
    about = "Fast block generator",
    after_help = SUFFIX_HELP
)]
struct Args {
    /// Write blocks of a repeating ASCII string (compresses well)
    #[arg(short = 'a', conflicts_with = "random")]
    ascii: bool,

    /// Write blocks of binary 'random' data (shouldn't compress)
    #[arg(short = 'r')]
    random: bool,

    /// Write blocksize
    #[arg(short = 'b', value_name = "bytes", value_parser = size_value, default_value = "1s")]
    block_size: u64,

    /// Number of blocks to write (zero for infinite)
    #[arg(short = 'c', value_name = "count", value_parser = size_value, default_value = "1k")]
    count: u64,

    /// Quiet operation
    #[arg(short = 'q')]
    quiet: bool,

    /// Display progress line
    #[arg(short = 'v')]
    verbose: bool,
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

    let sink = stdio::claim_stdout().context("claiming stdout")?;
    // -a is the default; -r overrides, and clap rejects both at once
    let mode = match (args.ascii, args.random) {
        (_, true) => FillMode::Rand,
        _ => FillMode::Ascii,
    };
    let config = GenConfig {
        mode,
        block_size: args.block_size,
        num_blocks: args.count,
        quiet: args.quiet,
        verbose: args.verbose,
    };
    let summary = blockgen::run(&config, sink, abort)?;
    if !config.quiet {
        eprintln!("{}", summary.report());
    }
    Ok(if summary.error.is_some() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
