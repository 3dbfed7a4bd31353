// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! CLI for the Avigilon Prometheus exporter (avex)

#[cfg(feature = "cli")]
use avexlib::config::{ExporterSettings, SettingFlags};
#[cfg(feature = "cli")]
use avexlib::daemon::{is_startup_fatal, ExporterDaemon};
#[cfg(feature = "cli")]
use avexlib::service::{platform_manager, ServiceAction};
#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand};
#[cfg(feature = "cli")]
use colored::Colorize;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "avex")]
#[command(about = "Avigilon Exporter: Prometheus metrics for Avigilon Control Center", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Run the Prometheus exporter, or manage it as a system service
    Exporter(ExporterArgs),
    /// Log in, run one scrape and print the result
    Check(CredentialArgs),
}

/// Connection settings; each falls back to its AVIGILON_* variable
#[cfg(feature = "cli")]
#[derive(Args, Debug, Clone, Default)]
struct CredentialArgs {
    /// Web Endpoint base URL, e.g. https://acc:8443/mt/api/rest/v1 [env: AVIGILON_HOST]
    #[arg(long)]
    host: Option<String>,

    /// Login user [env: AVIGILON_USERNAME, default: administrator]
    #[arg(long)]
    username: Option<String>,

    /// Login password [env: AVIGILON_PASSWORD]
    #[arg(long)]
    password: Option<String>,

    /// User nonce from the integration configuration [env: AVIGILON_NONCE]
    #[arg(long)]
    nonce: Option<String>,

    /// User key from the integration configuration [env: AVIGILON_KEY]
    #[arg(long)]
    key: Option<String>,

    /// Integration identifier [env: AVIGILON_INTEGRATION_ID]
    #[arg(long)]
    integration_id: Option<String>,
}

#[cfg(feature = "cli")]
#[derive(Args, Debug, Clone)]
struct ExporterArgs {
    #[command(flatten)]
    credentials: CredentialArgs,

    /// Port to listen on [env: AVIGILON_PORT, default: 9100]
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind [env: AVIGILON_LISTEN_ADDRESS, default: 0.0.0.0]
    #[arg(long)]
    listen_address: Option<String>,

    /// Service action instead of running: install, uninstall, start or stop
    #[arg(long, value_name = "ACTION")]
    service: Option<ServiceAction>,
}

#[cfg(feature = "cli")]
impl CredentialArgs {
    fn to_flags(&self) -> SettingFlags {
        SettingFlags {
            host: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            nonce: self.nonce.clone(),
            key: self.key.clone(),
            integration_id: self.integration_id.clone(),
            ..Default::default()
        }
    }
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "[ERROR]".red().bold(), e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Exporter(args) => {
            let flags = SettingFlags {
                port: args.port,
                listen_address: args.listen_address.clone(),
                ..args.credentials.to_flags()
            };
            let daemon = ExporterDaemon::new(ExporterSettings::resolve(&flags)?);

            match args.service {
                Some(action) => handle_service_action(&daemon, action)?,
                None => run_exporter(&daemon)?,
            }
        }
        Commands::Check(args) => {
            let daemon = ExporterDaemon::new(ExporterSettings::resolve(&args.to_flags())?);
            handle_check(&daemon)?;
        }
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn run_exporter(daemon: &ExporterDaemon) -> Result<(), Box<dyn std::error::Error>> {
    // Started by the SCM: the dispatcher owns the process until the service stops
    #[cfg(windows)]
    if avexlib::service::windows::run_as_service(daemon.clone())? {
        return Ok(());
    }

    let notify = std::sync::Arc::new(tokio::sync::Notify::new());
    let n = notify.clone();
    ctrlc::set_handler(move || {
        log::info!("Shutdown signal received");
        n.notify_one();
    })?;

    let shutdown = async move { notify.notified().await };
    daemon.run(shutdown).map_err(|e| {
        if is_startup_fatal(&e) {
            log::error!("Fatal: {}", e);
        }
        Box::<dyn std::error::Error>::from(e)
    })
}

#[cfg(feature = "cli")]
fn handle_service_action(
    daemon: &ExporterDaemon,
    action: ServiceAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = platform_manager();
    daemon.control(action, manager.as_ref())?;
    println!(
        "{} service action '{}' completed",
        "[OK]".green().bold(),
        action
    );
    Ok(())
}

#[cfg(feature = "cli")]
fn handle_check(daemon: &ExporterDaemon) -> Result<(), Box<dyn std::error::Error>> {
    let report = daemon.check()?;

    let host = &daemon.settings().credentials.base_url;
    eprintln!("{} {}", "Connected to".white(), host.cyan().bold());
    match report.sites {
        Some(count) => eprintln!("  {} {}", "Sites:".white(), count),
        None => eprintln!("  {} {}", "Sites:".white(), "unavailable".yellow()),
    }
    let status = if report.success {
        "ok".green()
    } else {
        "partial".yellow()
    };
    eprintln!("  {} {}", "Scrape:".white(), status);
    println!("{}", report.exposition);
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
