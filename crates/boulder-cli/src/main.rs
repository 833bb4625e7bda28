//! 🚀 boulder-cli: the front door, the bouncer, the maitre d' of boulder.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that parses flags, loads config,
//! sets up logging, and then lets the library do the heavy lifting.
//! Like a manager. 🦆

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use boulder::app_config::{RuntimeOverrides, load_config};
use boulder::progress::RunSummary;

// -- 🔧 the ol' reliable, picked up from the working directory when no path is given
const DEFAULT_CONFIG_FILE: &str = "boulder.toml";

/// 🪨 Replay failed metric writes from the queue back into the time-series database.
#[derive(Debug, Parser)]
#[command(name = "boulder", version)]
struct Cli {
    /// Config file. Defaults to ./boulder.toml when it exists.
    config: Option<PathBuf>,

    /// Max records per outgoing write.
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Max records processed in one run.
    #[arg(short, long)]
    chunk_size: Option<usize>,

    /// Seconds without a new record before the run ends.
    #[arg(long = "timeout", value_name = "SECS")]
    idle_timeout_secs: Option<u64>,

    /// Timestamp precision passed to the write endpoint (ns, u, ms, s).
    #[arg(long)]
    precision: Option<String>,

    /// Lower-case every message before re-writing it.
    #[arg(long)]
    normalize: bool,

    /// Log at debug level, whatever RUST_LOG says.
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            batch_size: self.batch_size,
            chunk_size: self.chunk_size,
            idle_timeout_secs: self.idle_timeout_secs,
            // -- a bare flag can only turn it on; leaving it off defers to the config
            normalize: self.normalize.then_some(true),
            precision: self.precision.clone(),
        }
    }
}

/// 🔒 An explicit path must exist. The default path is optional.
fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let exists = path.try_exists().context(format!(
                "💀 Couldn't check whether the configuration file exists. Was checking here: '{}'",
                path.display()
            ))?;
            if !exists {
                bail!(
                    "💀 Configuration file '{}' does not exist. Relative paths are relative to \
                     where you ran this, not where you wish you ran it. Use an absolute path to \
                     be absolutely certain.",
                    path.display()
                );
            }
            Ok(Some(path.to_path_buf()))
        }
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            Ok(default.is_file().then_some(default))
        }
    }
}

/// 🔄 Config in, one run out.
async fn replay(cli: &Cli) -> Result<RunSummary> {
    let config_path = resolve_config_path(cli.config.as_deref())?;
    let app_config = load_config(config_path.as_deref(), &cli.overrides()).context(
        "💀 In boulder-cli, main, we couldn't load the config. Make sure there is a \
         [queue_config.*] and a [sink_config.*] table, and that the flags make sense.",
    )?;
    boulder::run(app_config).await
}

/// 🚀 main(): where it all begins.
///
/// 🔧 Steps:
/// 1. Parse args
/// 2. Init tracing (so we can see what goes wrong, and when)
/// 3. Load config, flags on top
/// 4. Run one pass (send it and pray 🙏)
/// 5. Print the summary, or the error chain and exit 1
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 📡 logs go to stderr so the summary on stdout can be piped somewhere useful
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match replay(&cli).await {
        Ok(summary) => {
            println!("{}", summary);
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }

            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like something isn't reachable. Double-check that the queue \
                     and the time-series database are actually up. If you're using Docker, \
                     `docker ps` is a good first stop. ☕"
                );
            }

            // 🗑️ Exit with prejudice.
            std::process::exit(1);
        }
    }
}
