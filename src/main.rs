//! age Vanity Key Generator CLI
//!
//! Generates a new X25519 age identity whose recipient starts with a prefix.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{debug, error, warn};
use std::fs::{File, Metadata, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use age_vanity_keygen::backend::{CpuBackend, DEFAULT_BATCH_SIZE};
use age_vanity_keygen::identity::generate_identity;

const AFTER_HELP: &str = "\
PREFIX can not contain character '1'. It is transformed to lower case,
characters 'b', 'i' and 'o' are replaced for '6', '7' and '0' respectively.

If an OUTPUT file is specified, the public key is printed to standard error.
If OUTPUT already exists, it is not overwritten.

Examples:

    $ age-vanity-keygen 23456
    Found age123456... in 0s after 15855390 attempts (43267922 attempts/s)
    # created: 2025-08-18T18:18:18+02:00
    # public key: age123456gpgacec4alqvqnfdacx6djhx98wzwn4l3eh5q5n5ec2evdsfzn7tn
    AGE-SECRET-KEY-1XRTF5T02CR2HEC29RAH29Y46DPHQ7EAPK5EEPYKTFE3682LPWSCS4CXJSX

    $ age-vanity-keygen -o key.txt 23456
    Found age123456... in 2s after 74446587 attempts (43327977 attempts/s)
    Public key: age123456l7nurcmk5xfp5009lu65drh2ull7hghpkd0xlp3f4l7vv4sg8fdga";

#[derive(Parser)]
#[command(name = "age-vanity-keygen")]
#[command(about = "Generates a new vanity X25519 key pair with recipient PREFIX")]
#[command(version, disable_version_flag = true, after_help = AFTER_HELP)]
struct Cli {
    /// Desired recipient prefix
    prefix: String,

    /// Write the result to the file at path OUTPUT
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short = 'j', long, default_value_t = num_cpus::get())]
    threads: usize,

    /// Candidates tested by a worker between checks for cancellation
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, hide = true)]
    batch_size: u64,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,

    /// Print the version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        error!("report unexpected or unhelpful errors at https://github.com/AlexanderYastrebov/age-vanity-keygen");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            let level = match record.level() {
                log::Level::Warn => "warning".to_string(),
                level => level.as_str().to_lowercase(),
            };
            writeln!(buf, "age-vanity-keygen: {}: {}", level, record.args())
        })
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let (mut out, is_terminal): (Box<dyn Write>, bool) = match &cli.output {
        Some(path) => {
            let file = open_output(path)
                .with_context(|| format!("failed to open output file {:?}", path))?;
            if file.metadata().map(|m| world_readable(&m)).unwrap_or(false) {
                warn!("writing secret key to a world-readable file");
            }
            let is_terminal = file.is_terminal();
            (Box::new(file), is_terminal)
        }
        None => {
            if stdout_metadata().map(|m| world_readable(&m)).unwrap_or(false) {
                warn!("writing secret key to a world-readable file");
            }
            (Box::new(io::stdout().lock()), io::stdout().is_terminal())
        }
    };

    // Handle Ctrl+C
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        eprintln!("\nStopping...");
        let _ = stop_tx.try_send(());
    })
    .ok();

    let backend = CpuBackend::with_threads(cli.threads).with_batch_size(cli.batch_size);
    debug!(
        "using {} threads, batch size {}",
        backend.threads(),
        backend.batch_size()
    );
    let identity = generate_identity(&cli.prefix, &backend, &stop_rx).context("internal error")?;

    eprintln!("{}", identity.summary());
    if !is_terminal {
        eprintln!("Public key: {}", identity.recipient()?);
    }

    identity.write_key_file(&mut out, chrono::Local::now())?;
    out.flush().context("failed to write output")?;
    Ok(())
}

/// Create the output file, failing if it already exists
fn open_output(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(unix)]
fn stdout_metadata() -> io::Result<Metadata> {
    std::fs::metadata("/dev/stdout")
}

#[cfg(not(unix))]
fn stdout_metadata() -> io::Result<Metadata> {
    Err(io::ErrorKind::Unsupported.into())
}

#[cfg(unix)]
fn world_readable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.is_file() && metadata.permissions().mode() & 0o004 != 0
}

#[cfg(not(unix))]
fn world_readable(_metadata: &Metadata) -> bool {
    false
}
