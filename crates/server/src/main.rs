//! draftden server entry point.
//!
//! Usage:
//!   draftden-server --port <N> --card-data <path>
//!                   [--announcements-file <path>] [--alerts-file <path>]
//!
//! Exit codes: 0 clean shutdown, 1 usage error, 2 card-data load error,
//! 3 listen failure.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use draftden_core::cards::CardStore;
use draftden_server::hub::{HubConfig, ServerHandle};

struct Options {
    port: u16,
    card_data: PathBuf,
    announcements_file: Option<PathBuf>,
    alerts_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let options = parse_args();

    let store = match CardStore::load(&options.card_data) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(path = %options.card_data.display(), error = %e,
                "failed to load card data");
            std::process::exit(2);
        }
    };
    tracing::info!(sets = store.set_codes().len(), "card data loaded");

    let config = HubConfig {
        server_name: "draftden".to_string(),
        announcements_file: options.announcements_file,
        alerts_file: options.alerts_file,
    };
    let server = match ServerHandle::start(options.port, store, config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(port = options.port, error = %e, "failed to listen");
            std::process::exit(3);
        }
    };

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("interrupted, shutting down");
    server.shutdown();
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching -
/// no clap dependency.
fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut port = None;
    let mut card_data = None;
    let mut announcements_file = None;
    let mut alerts_file = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = Some(args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                }));
            }
            "--card-data" => {
                i += 1;
                card_data = Some(args.get(i).map(PathBuf::from).unwrap_or_else(|| {
                    eprintln!("--card-data requires a path");
                    std::process::exit(1);
                }));
            }
            "--announcements-file" => {
                i += 1;
                announcements_file =
                    Some(args.get(i).map(PathBuf::from).unwrap_or_else(|| {
                        eprintln!("--announcements-file requires a path");
                        std::process::exit(1);
                    }));
            }
            "--alerts-file" => {
                i += 1;
                alerts_file = Some(args.get(i).map(PathBuf::from).unwrap_or_else(|| {
                    eprintln!("--alerts-file requires a path");
                    std::process::exit(1);
                }));
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(port) = port else {
        eprintln!("--port is required");
        print_usage();
        std::process::exit(1);
    };
    let Some(card_data) = card_data else {
        eprintln!("--card-data is required");
        print_usage();
        std::process::exit(1);
    };

    Options {
        port,
        card_data,
        announcements_file,
        alerts_file,
    }
}

fn print_usage() {
    println!("Usage: draftden-server --port <N> --card-data <path> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <N>                   Listen port (required)");
    println!("  --card-data <path>           Card database JSON file (required)");
    println!("  --announcements-file <path>  Announcements text, reread on SIGHUP");
    println!("  --alerts-file <path>         Alerts text, reread on SIGHUP");
    println!("  --help, -h                   Show this help");
}
