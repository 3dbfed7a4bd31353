// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Windows service control manager (SCM) integration
//!
//! The service is registered as an auto-start, own-process service that the
//! SCM restarts after a failure. Its configuration comes from the registry
//! value `HKLM\SYSTEM\CurrentControlSet\Services\avigilon-exporter\Environment`
//! (REG_MULTI_SZ, one `AVIGILON_*=value` per line), which the SCM turns into
//! the process environment at start.
//!
//! When started by the SCM, the binary hands control to the service
//! dispatcher (see `run_as_service`), which runs the exporter until the SCM
//! sends a stop or shutdown control.

use super::{ServiceDefinition, ServiceManager};
use crate::error::{ExporterError, Result};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[cfg(windows)]
pub use scm::{run_as_service, LocalScm};

/// Delay before the SCM restarts a failed service
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Registry key whose `Environment` value configures the service
pub fn environment_key(service_name: &str) -> String {
    format!(
        r"HKLM\SYSTEM\CurrentControlSet\Services\{}\Environment",
        service_name
    )
}

/// Service registration as handed to the SCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScmServiceSpec {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub executable: PathBuf,
    pub arguments: Vec<String>,
    pub auto_start: bool,
    /// `None` leaves failure recovery unset
    pub restart_delay: Option<Duration>,
}

impl From<&ServiceDefinition> for ScmServiceSpec {
    fn from(definition: &ServiceDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            display_name: definition.display_name.clone(),
            description: definition.description.clone(),
            executable: definition.executable.clone(),
            arguments: definition.arguments.clone(),
            auto_start: true,
            restart_delay: Some(RESTART_DELAY),
        }
    }
}

/// Operations needed from the service control manager
pub trait ServiceControlManager {
    fn exists(&self, name: &str) -> Result<bool>;
    fn create(&self, spec: &ScmServiceSpec) -> Result<()>;
    fn delete(&self, name: &str) -> Result<()>;
    fn start(&self, name: &str) -> Result<()>;
    fn stop(&self, name: &str) -> Result<()>;
}

/// SCM-backed [`ServiceManager`]
#[derive(Debug, Clone)]
pub struct WindowsManager<S> {
    scm: S,
}

#[cfg(windows)]
impl WindowsManager<LocalScm> {
    /// Manager for the local computer's SCM
    pub fn local() -> Self {
        Self::with_scm(LocalScm)
    }
}

impl<S: ServiceControlManager> WindowsManager<S> {
    pub fn with_scm(scm: S) -> Self {
        Self { scm }
    }
}

impl<S: ServiceControlManager> ServiceManager for WindowsManager<S> {
    fn name(&self) -> &'static str {
        "Windows SCM"
    }

    fn install(&self, definition: &ServiceDefinition) -> Result<()> {
        if self.scm.exists(&definition.name)? {
            return Err(ExporterError::Service(format!(
                "service {} is already installed",
                definition.name
            )));
        }
        self.scm.create(&ScmServiceSpec::from(definition))
    }

    fn uninstall(&self, name: &str) -> Result<()> {
        if !self.scm.exists(name)? {
            return Err(ExporterError::Service(format!(
                "service {} is not installed",
                name
            )));
        }
        if let Err(e) = self.scm.stop(name) {
            log::debug!("Stop before uninstall of {} failed: {}", name, e);
        }
        self.scm.delete(name)
    }

    fn start(&self, name: &str) -> Result<()> {
        self.scm.start(name)
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.scm.stop(name)
    }

    fn environment_hint(&self) -> String {
        format!(
            "{} (REG_MULTI_SZ, one KEY=value per line)",
            environment_key(super::SERVICE_NAME)
        )
    }
}

/// Control request received from the SCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Stop,
    Shutdown,
    Interrogate,
    Other,
}

/// Turns SCM stop/shutdown controls into the exporter's shutdown future
#[derive(Debug, Clone, Default)]
pub struct StopBridge {
    notify: Arc<Notify>,
}

impl StopBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one control; `false` means the control is not implemented
    pub fn handle(&self, event: ControlEvent) -> bool {
        match event {
            ControlEvent::Stop | ControlEvent::Shutdown => {
                log::info!("Stopping service...");
                self.notify.notify_one();
                true
            }
            ControlEvent::Interrogate => true,
            ControlEvent::Other => false,
        }
    }

    /// Resolves once a stop or shutdown control arrived, even if it came first
    pub fn stopped(&self) -> impl Future<Output = ()> + Send + 'static {
        let notify = self.notify.clone();
        async move { notify.notified().await }
    }
}

#[cfg(windows)]
mod scm {
    use super::{ControlEvent, ScmServiceSpec, ServiceControlManager, StopBridge};
    use crate::daemon::ExporterDaemon;
    use crate::error::{ExporterError, Result};
    use crate::service::SERVICE_NAME;
    use std::ffi::{OsStr, OsString};
    use std::sync::OnceLock;
    use std::time::Duration;
    use windows_service::service::{
        ServiceAccess, ServiceAction as RecoveryAction, ServiceActionType, ServiceControl,
        ServiceControlAccept, ServiceErrorControl, ServiceExitCode, ServiceFailureActions,
        ServiceFailureResetPeriod, ServiceInfo, ServiceStartType, ServiceState, ServiceStatus,
        ServiceType,
    };
    use windows_service::service_control_handler::{self, ServiceControlHandlerResult};
    use windows_service::service_dispatcher;
    use windows_service::service_manager::{
        ServiceManager as WinServiceManager, ServiceManagerAccess,
    };

    const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
    const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: i32 = 1063;

    /// Failure counter reset window for the recovery actions
    const FAILURE_RESET_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

    static DAEMON: OnceLock<ExporterDaemon> = OnceLock::new();

    fn scm_error(context: &str, err: windows_service::Error) -> ExporterError {
        ExporterError::Service(format!("{}: {}", context, err))
    }

    /// The local computer's service control manager
    #[derive(Debug, Default, Clone, Copy)]
    pub struct LocalScm;

    impl LocalScm {
        fn connect(&self, access: ServiceManagerAccess) -> Result<WinServiceManager> {
            WinServiceManager::local_computer(None::<&str>, access)
                .map_err(|e| scm_error("failed to connect to the service control manager", e))
        }
    }

    impl ServiceControlManager for LocalScm {
        fn exists(&self, name: &str) -> Result<bool> {
            let manager = self.connect(ServiceManagerAccess::CONNECT)?;
            match manager.open_service(name, ServiceAccess::QUERY_STATUS) {
                Ok(_) => Ok(true),
                Err(windows_service::Error::Winapi(e))
                    if e.raw_os_error() == Some(ERROR_SERVICE_DOES_NOT_EXIST) =>
                {
                    Ok(false)
                }
                Err(e) => Err(scm_error("failed to query service", e)),
            }
        }

        fn create(&self, spec: &ScmServiceSpec) -> Result<()> {
            let manager =
                self.connect(ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE)?;
            let info = ServiceInfo {
                name: OsString::from(&spec.name),
                display_name: OsString::from(&spec.display_name),
                service_type: ServiceType::OWN_PROCESS,
                start_type: if spec.auto_start {
                    ServiceStartType::AutoStart
                } else {
                    ServiceStartType::OnDemand
                },
                error_control: ServiceErrorControl::Normal,
                executable_path: spec.executable.clone(),
                launch_arguments: spec.arguments.iter().map(OsString::from).collect(),
                dependencies: Vec::new(),
                account_name: None,
                account_password: None,
            };

            let service = manager
                .create_service(&info, ServiceAccess::CHANGE_CONFIG | ServiceAccess::START)
                .map_err(|e| scm_error("failed to create service", e))?;
            service
                .set_description(&spec.description)
                .map_err(|e| scm_error("failed to set service description", e))?;

            if let Some(delay) = spec.restart_delay {
                service
                    .update_failure_actions(ServiceFailureActions {
                        reset_period: ServiceFailureResetPeriod::After(FAILURE_RESET_PERIOD),
                        reboot_msg: None,
                        command: None,
                        actions: Some(vec![RecoveryAction {
                            action_type: ServiceActionType::Restart,
                            delay,
                        }]),
                    })
                    .map_err(|e| scm_error("failed to set recovery actions", e))?;
            }
            Ok(())
        }

        fn delete(&self, name: &str) -> Result<()> {
            let manager = self.connect(ServiceManagerAccess::CONNECT)?;
            manager
                .open_service(name, ServiceAccess::DELETE)
                .and_then(|service| service.delete())
                .map_err(|e| scm_error("failed to delete service", e))
        }

        fn start(&self, name: &str) -> Result<()> {
            let manager = self.connect(ServiceManagerAccess::CONNECT)?;
            manager
                .open_service(name, ServiceAccess::START)
                .and_then(|service| service.start::<&OsStr>(&[]))
                .map_err(|e| scm_error("failed to start service", e))
        }

        fn stop(&self, name: &str) -> Result<()> {
            let manager = self.connect(ServiceManagerAccess::CONNECT)?;
            manager
                .open_service(name, ServiceAccess::STOP)
                .and_then(|service| service.stop())
                .map(|_| ())
                .map_err(|e| scm_error("failed to stop service", e))
        }
    }

    windows_service::define_windows_service!(ffi_service_main, service_main);

    /// Hand the process to the SCM dispatcher
    ///
    /// Returns `Ok(false)` when the process was not started by the SCM, in
    /// which case the caller runs the exporter interactively.
    pub fn run_as_service(daemon: ExporterDaemon) -> Result<bool> {
        if DAEMON.set(daemon).is_err() {
            return Err(ExporterError::Service(
                "service dispatcher already started".into(),
            ));
        }
        match service_dispatcher::start(SERVICE_NAME, ffi_service_main) {
            Ok(()) => Ok(true),
            Err(windows_service::Error::Winapi(e))
                if e.raw_os_error() == Some(ERROR_FAILED_SERVICE_CONTROLLER_CONNECT) =>
            {
                Ok(false)
            }
            Err(e) => Err(scm_error("service dispatcher failed", e)),
        }
    }

    fn service_main(_arguments: Vec<OsString>) {
        if let Err(e) = run_service() {
            log::error!("Service failed: {}", e);
        }
    }

    fn status(state: ServiceState, exit_code: u32) -> ServiceStatus {
        ServiceStatus {
            service_type: ServiceType::OWN_PROCESS,
            current_state: state,
            controls_accepted: if state == ServiceState::Running {
                ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN
            } else {
                ServiceControlAccept::empty()
            },
            exit_code: ServiceExitCode::ServiceSpecific(exit_code),
            checkpoint: 0,
            wait_hint: Duration::default(),
            process_id: None,
        }
    }

    fn run_service() -> Result<()> {
        let daemon = DAEMON
            .get()
            .ok_or_else(|| ExporterError::Service("service started without settings".into()))?;

        let bridge = StopBridge::new();
        let handler = bridge.clone();
        let status_handle = service_control_handler::register(SERVICE_NAME, move |control| {
            let event = match control {
                ServiceControl::Stop => ControlEvent::Stop,
                ServiceControl::Shutdown => ControlEvent::Shutdown,
                ServiceControl::Interrogate => ControlEvent::Interrogate,
                _ => ControlEvent::Other,
            };
            if handler.handle(event) {
                ServiceControlHandlerResult::NoError
            } else {
                ServiceControlHandlerResult::NotImplemented
            }
        })
        .map_err(|e| scm_error("failed to register control handler", e))?;

        status_handle
            .set_service_status(status(ServiceState::Running, 0))
            .map_err(|e| scm_error("failed to report running state", e))?;

        let result = daemon.run(bridge.stopped());
        let exit_code = if result.is_ok() { 0 } else { 1 };

        status_handle
            .set_service_status(status(ServiceState::Stopped, exit_code))
            .map_err(|e| scm_error("failed to report stopped state", e))?;
        result
    }
}
