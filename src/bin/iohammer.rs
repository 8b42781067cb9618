//! iohammer - random-offset I/O load generator.
//!
//! Hammers a file, device, or temporary file with concurrent
//! random-offset reads and writes and reports operation throughput.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use iotools::fill::FillMode;
use iotools::hammer::{ self, DispatchModel, HammerConfig, Target };
use iotools::size::{ getnum, SUFFIX_HELP };
use iotools::AbortFlag;

#[cfg(feature = "credit-dispatch")]
const DISPATCH_MODEL: DispatchModel = DispatchModel::CreditDispatch;
#[cfg(not(feature = "credit-dispatch"))]
const DISPATCH_MODEL: DispatchModel = DispatchModel::SharedCounter;

fn size_value(s: &str) -> Result<u64, std::convert::Infallible> {
    Ok(getnum(s))
}

#[derive(Parser, Debug)]
#[command(
    name = "iohammer",
    version,
    about = "Random-offset I/O load generator",
    after_help = SUFFIX_HELP
)]
struct Args {
    /// Write blocks of a repeating ASCII string
    #[arg(short = 'a', conflicts_with = "random")]
    ascii: bool,

    /// Write blocks of binary 'random' data
    #[arg(short = 'r')]
    random: bool,

    /// Ignore I/O errors and continue
    #[arg(short = 'i')]
    ignore: bool,

    /// Unformatted output: tab-separated size, threads, blocksize,
    /// write-pct, count, writes, seconds, rate
    #[arg(short = 'u')]
    unformatted: bool,

    /// Display progress line
    #[arg(short = 'v')]
    verbose: bool,

    /// Blocksize of each operation
    #[arg(short = 'b', value_name = "bytes", value_parser = size_value, default_value = "1s")]
    block_size: u64,

    /// Number of operations (zero for infinite)
    #[arg(short = 'c', value_name = "count", value_parser = size_value, default_value = "0")]
    count: u64,

    /// Integer percentage of operations to be writes
    #[arg(short = 'w', value_name = "write%", default_value_t = 0)]
    write_pct: u32,

    /// Number of threads to do I/O
    #[arg(short = 't', value_name = "threads", default_value_t = 8)]
    threads: usize,

    /// Size of file/device to create/use (0 to discover it)
    #[arg(short = 's', value_name = "size", value_parser = size_value, default_value = "1m")]
    size: u64,

    /// File (must exist), directory or device; a directory gets a
    /// temporary file
    #[arg(short = 'f', value_name = "file", default_value = ".")]
    file: PathBuf,
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
    // -a is the default; -r overrides, and clap rejects both at once
    let mode = match (args.ascii, args.random) {
        (_, true) => FillMode::Rand,
        _ => FillMode::Ascii,
    };
    let config = HammerConfig {
        mode,
        block_size: args.block_size,
        iolimit: args.count,
        write_pct: args.write_pct,
        threads: args.threads,
        ignore_errors: args.ignore,
        verbose: args.verbose,
        model: DISPATCH_MODEL,
    }.clamped()?;

    let target = Target::open(&args.file, args.size, config.threads, config.write_pct > 0)?;
    let file_size = target.size;
    if !args.unformatted {
        print!("Size {file_size}: ");
        let _ = std::io::stdout().flush();
    }

    let abort = AbortFlag::new();
    abort.install_sigint_handler();

    let report = hammer::run(&config, target, abort)?;
    if args.unformatted {
        println!("{}", report.unformatted(&config, file_size));
    } else {
        println!("{}", report.formatted());
    }
    Ok(if report.error.is_some() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
