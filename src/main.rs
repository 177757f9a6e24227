//! Binary entrypoint for the check-mate CLI.
//!
//! Commands:
//! - `start [--host <addr>]` - connect to a Meshtastic node over TCP and answer checks
//! - `init` - write a starter `config.toml`
//! - `status` - print the last status file; exit code 0 only when active
//!
//! Every `start` flag can also come from the environment (`HOST`, `LOCATION`,
//! `HEALTHCHECKURL`, `STATUS_DIR`, `LATITUDE`, `LONGITUDE`, `WEATHER_API_KEY`,
//! `SCHEDULED_MESSAGES`) and wins over the config file.
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};

use checkmate::config::{Config, Overrides};
use checkmate::station::run_station;
use checkmate::station::status::{Status, StatusManager};

#[derive(Parser)]
#[command(name = "check-mate")]
#[command(about = "Radio check and signal report bot for Meshtastic mesh networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the radio and start answering
    Start {
        /// Meshtastic node hostname or IP (TCP API on mesh.port)
        #[arg(long, env = "HOST")]
        host: Option<String>,

        /// Human-readable station location used in replies
        #[arg(long, env = "LOCATION")]
        location: Option<String>,

        /// URL to HEAD whenever packets arrive
        #[arg(long = "healthcheck", env = "HEALTHCHECKURL")]
        healthcheck_url: Option<String>,

        /// Directory holding status.json
        #[arg(long, env = "STATUS_DIR")]
        status_dir: Option<String>,

        /// Station latitude for weather lookups
        #[arg(long, env = "LATITUDE", allow_hyphen_values = true)]
        latitude: Option<f64>,

        /// Station longitude for weather lookups
        #[arg(long, env = "LONGITUDE", allow_hyphen_values = true)]
        longitude: Option<f64>,

        /// OpenWeatherMap API key
        #[arg(long, env = "WEATHER_API_KEY", hide_env_values = true)]
        weather_api_key: Option<String>,

        /// Scheduled messages, `days;HH:MM;timezone;channel;message` separated by `;;;`
        #[arg(long, env = "SCHEDULED_MESSAGES")]
        scheduled_messages: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Show the status written by a running station
    Status {
        /// Directory holding status.json
        #[arg(long, env = "STATUS_DIR")]
        status_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load_or_default(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start {
            host,
            location,
            healthcheck_url,
            status_dir,
            latitude,
            longitude,
            weather_api_key,
            scheduled_messages,
        } => {
            let mut config = match pre_config {
                Some(config) => config,
                None => Config::load_or_default(&cli.config).await?,
            };
            config.apply_overrides(Overrides {
                host,
                location,
                healthcheck_url,
                status_dir,
                latitude,
                longitude,
                weather_api_key,
                scheduled_messages,
            });

            info!("Starting check-mate v{}", env!("CARGO_PKG_VERSION"));
            if let Err(e) = run_station(config).await {
                error!("Station stopped: {:#}", e);
                return Err(e);
            }
            info!("check-mate stopped");
        }
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            println!("Created default configuration at {}", cli.config);
            println!("Set mesh.host (or HOST) before running `check-mate start`.");
        }
        Commands::Status { status_dir } => {
            let mut config = pre_config.unwrap_or_default();
            config.apply_overrides(Overrides {
                status_dir,
                ..Overrides::default()
            });
            let manager = StatusManager::new(config.status_dir());
            let record = manager.read().await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if record.status != Status::Active {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| log::LevelFilter::from_str(&cfg.logging.level).ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    if let Some(f) = log_file {
        let file = std::sync::Mutex::new(f);
        // Under a supervisor stdout is usually not a terminal; the file is enough then.
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
