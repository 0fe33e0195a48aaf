#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use geoalert::types::{EventType, HistoryQuery};
use geoalert::{BackendOrigin, Error as GeoAlertError, GeoAlertClient};
use geoconfig::{GeoConfig, LastSuccess};
use std::fmt::Write;
use std::process;
use tracing_subscriber::EnvFilter;
mod history;
mod send;

#[derive(Parser)]
#[command(name = "geoline", about = "One-shot location reports for Geo Alert")]
struct Cli {
    /// Backend origin, e.g. https://geo-alert.example.com (overrides the config file)
    #[arg(long, global = true)]
    origin: Option<String>,
    /// Log more (-v for debug, -vv for trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report a location
    Send {
        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Event type (manual/night/emergency/auto/stopped_confirmed)
        #[arg(long = "type", short = 't')]
        event_type: Option<EventType>,
        /// Skip the confirmation prompt for emergency sends
        #[arg(long, short)]
        yes: bool,
        /// How many times to resend after a failure
        #[arg(long)]
        retries: Option<u32>,
        /// Print payload, status, parsed body and raw body
        #[arg(long)]
        debug: bool,
    },
    /// List previously reported events, newest first
    History {
        /// Events per page
        #[arg(long)]
        limit: Option<u32>,
        /// Only list events older than this cursor
        #[arg(long)]
        before: Option<String>,
        /// Number of pages to read
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Show the last location the backend accepted
    Last,
    /// Fetch an auth token and print it
    Token,
    /// Generate shell completions
    #[command(hide = true)]
    Completions {
        /// The shell to generate completions for
        shell: Shell,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "error",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn get_client(config: &GeoConfig, origin: Option<&str>) -> Result<GeoAlertClient> {
    let origin = match origin {
        Some(origin) => origin.to_string(),
        None => config
            .backend_origin()
            .with_context(|| "Missing backend origin; pass --origin or set BACKEND_ORIGIN")?,
    };
    let origin = BackendOrigin::new(origin)?;
    Ok(GeoAlertClient::new(origin))
}

fn format_backend_error(status: u16, body: &str) -> String {
    let mut output = format!("Backend error ({status}).");

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        match value.get("error") {
            Some(serde_json::Value::String(text)) => {
                let _ = write!(output, "\n  {text}");
            }
            Some(other) => {
                if let Ok(pretty) = serde_json::to_string_pretty(other) {
                    output.push('\n');
                    output.push_str(&pretty);
                }
            }
            None => {}
        }
        return output;
    }

    if !body.trim().is_empty() {
        output.push('\n');
        output.push_str(body.trim());
    }

    output
}

fn handle_error(err: &anyhow::Error) -> ! {
    if let Some(GeoAlertError::BackendError { status, body }) =
        err.downcast_ref::<GeoAlertError>()
    {
        eprintln!("{}", format_backend_error(*status, body));
        process::exit(1);
    }

    eprintln!("{err:#}");
    process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        handle_error(&err);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "geoline", &mut std::io::stdout());
        }
        Command::Last => match LastSuccess::load() {
            Some(last) => println!("{}", send::format_last_success(&last)),
            None => println!("Nothing sent yet."),
        },
        Command::Send {
            lat,
            lng,
            event_type,
            yes,
            retries,
            debug,
        } => {
            let config = GeoConfig::load().with_context(|| "Failed to load geoalert config")?;
            let client = get_client(&config, cli.origin.as_deref())?;
            let event_type = match event_type {
                Some(event_type) => event_type,
                None => config.send.default_event_type.parse::<EventType>()?,
            };
            let request = send::SendRequest {
                lat,
                lng,
                event_type,
                confirmed: yes,
                retries: retries.unwrap_or(config.send.retries),
                debug,
            };
            send::send_location(&client, &request).await?;
        }
        Command::History {
            limit,
            before,
            pages,
        } => {
            let config = GeoConfig::load().with_context(|| "Failed to load geoalert config")?;
            let client = get_client(&config, cli.origin.as_deref())?;
            let mut query = HistoryQuery::new(limit.unwrap_or(config.history.limit));
            if let Some(before) = before {
                query = query.with_before(before);
            }
            history::show_history(&client, query, pages).await?;
        }
        Command::Token => {
            let config = GeoConfig::load().with_context(|| "Failed to load geoalert config")?;
            let client = get_client(&config, cli.origin.as_deref())?;
            let token = client.token().await?;
            println!("{token}");
        }
    }

    Ok(())
}
