// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Exporter lifecycle
//!
//! Runs the exporter in the foreground until a shutdown signal arrives, or
//! performs one service-manager action and returns.

use crate::client::{VmsBackend, VmsClient};
use crate::collector::ScrapeCollector;
use crate::config::{env_vars, ExporterSettings};
use crate::error::{ExporterError, Result};
use crate::http_server::{HttpServer, HttpServerConfig};
use crate::service::{ServiceAction, ServiceDefinition, ServiceManager, SERVICE_NAME};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How long in-flight scrapes may run once shutdown is requested
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on tearing down the runtime after the server returned
///
/// A scrape stuck in a backend call keeps its blocking worker busy; the
/// runtime abandons it after this long.
pub const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of a one-off `check` run
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Sites visible to the user, `None` if the sites call failed
    pub sites: Option<usize>,
    pub success: bool,
    /// Rendered exposition of the single scrape
    pub exposition: String,
}

/// Lifecycle controller for one resolved configuration
#[derive(Debug, Clone)]
pub struct ExporterDaemon {
    settings: ExporterSettings,
}

impl ExporterDaemon {
    pub fn new(settings: ExporterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExporterSettings {
        &self.settings
    }

    /// Run the export server in the foreground until `shutdown` resolves
    ///
    /// Fails before binding if required credentials are missing, and before
    /// serving if the initial login is rejected.
    pub fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.settings.credentials.validate()?;

        // The blocking client owns its own runtime and must be built and
        // dropped outside of tokio.
        let client = VmsClient::new(self.settings.credentials.clone())?;
        let collector = Arc::new(ScrapeCollector::new(client));

        log::info!(
            "Attempting initial login to {}...",
            self.settings.credentials.base_url
        );
        collector.authenticate().map_err(|e| {
            log::error!("Initial login failed: {}", e);
            e
        })?;

        let result = self.serve(collector.clone(), shutdown);
        drop(collector);
        result
    }

    fn serve<B, F>(&self, collector: Arc<ScrapeCollector<B>>, shutdown: F) -> Result<()>
    where
        B: VmsBackend + 'static,
        F: Future<Output = ()>,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let config = HttpServerConfig {
            bind_address: self.settings.listen_address.clone(),
            port: self.settings.port,
            shutdown_grace: SHUTDOWN_GRACE,
            ..Default::default()
        };

        let result = runtime.block_on(async move {
            let server = HttpServer::bind(config, collector).await?;
            server.serve(shutdown).await
        });

        runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
        log::info!("Exporter stopped");
        result
    }

    /// Authenticate and run a single scrape without starting the server
    pub fn check(&self) -> Result<CheckReport> {
        self.settings.credentials.validate()?;

        let client = VmsClient::new(self.settings.credentials.clone())?;
        let collector = ScrapeCollector::new(client);
        collector.authenticate()?;

        let sites = match collector.with_backend(|client| client.fetch_sites()) {
            Ok(sites) => Some(sites.len()),
            Err(e) => {
                log::warn!("Could not list sites: {}", e);
                None
            }
        };

        let snapshot = collector.collect();
        Ok(CheckReport {
            sites,
            success: snapshot.success(),
            exposition: snapshot.to_exposition().export(),
        })
    }

    /// Operator hint when the service is installed without its secrets
    pub fn install_warning(&self, manager: &dyn ServiceManager) -> Option<String> {
        if self.settings.credentials.has_secrets() {
            return None;
        }
        Some(format!(
            "Credentials not provided via flags. Set {} in {} before starting the service",
            env_vars::REQUIRED.join(", "),
            manager.environment_hint()
        ))
    }

    /// Perform one service-manager action
    pub fn control(&self, action: ServiceAction, manager: &dyn ServiceManager) -> Result<()> {
        log::info!("Executing service action '{}' via {}", action, manager.name());

        match action {
            ServiceAction::Install => {
                if let Some(warning) = self.install_warning(manager) {
                    log::warn!("{}", warning);
                }
                let definition =
                    ServiceDefinition::for_current_exe(self.settings.service_arguments())?;
                manager.install(&definition)?;
            }
            ServiceAction::Uninstall => manager.uninstall(SERVICE_NAME)?,
            ServiceAction::Start => manager.start(SERVICE_NAME)?,
            ServiceAction::Stop => manager.stop(SERVICE_NAME)?,
        }

        log::info!("Service action '{}' completed", action);
        Ok(())
    }
}

/// Whether `err` should end the process before serving
pub fn is_startup_fatal(err: &ExporterError) -> bool {
    matches!(
        err,
        ExporterError::Authentication(_) | ExporterError::Configuration(_)
    )
}
