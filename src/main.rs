//! Icing Monitoring Service - Main Daemon
//!
//! A server-side daemon that, every hour and for every configured wind site:
//! 1. Fetches point forecasts (SpotWx) and turbine/sensor telemetry (Bazefield)
//! 2. Reconciles the new batch into the stored hourly history
//! 3. Classifies icing type and operating zones per source group
//! 4. Alerts when three consecutive forecast hours in the next 12 show icing
//!
//! Usage:
//!   cargo run --release                          # Run continuously
//!   cargo run --release -- --once                # Single pass, then exit
//!   cargo run --release -- --sites MN,DFS        # Only these sites
//!   cargo run --release -- --log-file icemon.log # Also log to a file
//!
//! Environment: see .env.example (SPOTWX_API_KEY, BAZEFIELD_*, DATABASE_URL, ICEMON_*)

use icemon_service::daemon::{Daemon, DaemonConfig};
use icemon_service::logging;
use std::env;
use std::path::PathBuf;
use tracing::{error, info};

struct CliArgs {
    once: bool,
    sites: Option<Vec<String>>,
    log_file: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs { once: false, sites: None, log_file: None };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" => {
                cli.once = true;
                i += 1;
            }
            "--sites" => {
                let list = args.get(i + 1).ok_or("--sites requires a comma-separated list")?;
                let sites: Vec<String> = list
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if sites.is_empty() {
                    return Err("--sites requires at least one site id".to_string());
                }
                cli.sites = Some(sites);
                i += 2;
            }
            "--log-file" => {
                let path = args.get(i + 1).ok_or("--log-file requires a path")?;
                cli.log_file = Some(PathBuf::from(path));
                i += 2;
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(cli)
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            eprintln!("Usage: {} [--once] [--sites A,B,C] [--log-file PATH]", args[0]);
            std::process::exit(2);
        }
    };

    if let Err(e) = logging::init(cli.log_file.as_deref()) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    let mut config = match DaemonConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    config.site_filter = cli.sites;
    config.log_file = cli.log_file;

    let mut daemon = Daemon::with_config(config);

    info!("initializing daemon");
    if let Err(e) = daemon.initialize() {
        error!("initialization failed: {}", e);
        std::process::exit(1);
    }
    info!(sites = daemon.site_ids().len(), "daemon initialized");

    if cli.once {
        match daemon.run_once() {
            Ok(summary) => {
                for report in &summary.reports {
                    info!(
                        site = %report.site_id,
                        rows = report.rows,
                        groups = report.groups.len(),
                        decision = ?report.decision,
                        "site complete"
                    );
                }
                if !summary.failures.is_empty() {
                    std::process::exit(1);
                }
            }
            Err(e) => {
                error!("run failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = daemon.run() {
        error!("daemon error: {}", e);
        std::process::exit(1);
    }
}
