//! Smoke test for background ZIP writing.
//!
//! Writes `test/test.txt`, `test/test2.txt` and `test/test/test3.txt`, compresses
//! them into `test.zip` through a background job polled once per second, and exits
//! with status 1 if the job fails or the arguments are invalid.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tzip::client::{self, SmokeConfig, SmokeError};

#[derive(Parser, Debug)]
#[command(name = "tzip-smoke", version, about = "Compress three test files in the background")]
struct Args {
    /// Directory holding the test files and the archive
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Archive path, relative to the working directory
    #[arg(long, default_value = "test.zip")]
    archive: PathBuf,

    /// Compression level: 0 stores, 1-9 deflate, negative uses the default
    #[arg(long, default_value_t = client::DEFAULT_LEVEL, allow_negative_numbers = true)]
    level: i32,

    /// Delay between status polls
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Entries compressed concurrently
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Use the test files already on disk instead of writing them
    #[arg(long)]
    no_fixtures: bool,

    /// Reopen the archive and compare every entry with its source
    #[arg(long)]
    verify: bool,
}

impl From<Args> for SmokeConfig {
    fn from(args: Args) -> Self {
        SmokeConfig {
            workdir: args.workdir,
            archive: args.archive,
            level: args.level,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            threads: args.threads,
            create_fixtures: !args.no_fixtures,
            verify: args.verify,
        }
    }
}

fn main() -> ExitCode {
    // stderr carries the single failure line unless RUST_LOG asks for more
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if !err.use_stderr() => {
            // --help and --version
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };
    let config = SmokeConfig::from(args);
    match client::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ SmokeError::JobFailed { .. }) => {
            eprintln!("{}", err);
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("tzip-smoke: {}", err);
            ExitCode::from(1)
        }
    }
}
