// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! systemd service manager
//!
//! Installs a system unit under `/etc/systemd/system` and drives it through
//! `systemctl`. Secrets can be kept out of the unit by placing `AVIGILON_*`
//! variables in the optional environment file the unit references.

use super::{ServiceDefinition, ServiceManager};
use crate::error::{ExporterError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const SYSTEM_UNIT_DIR: &str = "/etc/systemd/system";
pub const ENVIRONMENT_FILE: &str = "/etc/avigilon-exporter/environment";

/// Unit files hold credentials passed as flags
const UNIT_FILE_MODE: u32 = 0o640;

/// Runs external control commands
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<()>;
}

/// Runs commands on the host via [`std::process::Command`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommand;

impl CommandRunner for SystemCommand {
    fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        let output = Command::new(program).args(args).output().map_err(|e| {
            ExporterError::Service(format!("failed to run `{}`: {}", program, e))
        })?;
        if !output.status.success() {
            return Err(ExporterError::Service(format!(
                "`{} {}` failed with {}: {}",
                program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// systemd-backed [`ServiceManager`]
#[derive(Debug, Clone)]
pub struct SystemdManager<R = SystemCommand> {
    unit_dir: PathBuf,
    environment_file: PathBuf,
    runner: R,
}

impl SystemdManager<SystemCommand> {
    /// Manager for the host's system instance
    pub fn system() -> Self {
        Self::with_runner(SYSTEM_UNIT_DIR, ENVIRONMENT_FILE, SystemCommand)
    }
}

impl<R: CommandRunner> SystemdManager<R> {
    pub fn with_runner(
        unit_dir: impl Into<PathBuf>,
        environment_file: impl Into<PathBuf>,
        runner: R,
    ) -> Self {
        Self {
            unit_dir: unit_dir.into(),
            environment_file: environment_file.into(),
            runner,
        }
    }

    /// Path of the unit file for service `name`
    pub fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(format!("{}.service", name))
    }

    /// Render the unit file for `definition`
    pub fn render_unit(&self, definition: &ServiceDefinition) -> String {
        let mut exec = quote_arg(&definition.executable.display().to_string());
        for arg in &definition.arguments {
            exec.push(' ');
            exec.push_str(&quote_arg(arg));
        }

        format!(
            "[Unit]\n\
             Description={display} - {description}\n\
             After=network-online.target\n\
             Wants=network-online.target\n\
             \n\
             [Service]\n\
             Type=simple\n\
             ExecStart={exec}\n\
             EnvironmentFile=-{env}\n\
             Restart=on-failure\n\
             RestartSec=5\n\
             TimeoutStopSec=10\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            display = definition.display_name,
            description = definition.description,
            exec = exec,
            env = self.environment_file.display(),
        )
    }

    fn systemctl(&self, args: &[&str]) -> Result<()> {
        self.runner.run("systemctl", args)
    }
}

impl<R: CommandRunner> ServiceManager for SystemdManager<R> {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn install(&self, definition: &ServiceDefinition) -> Result<()> {
        let unit_path = self.unit_path(&definition.name);
        if unit_path.exists() {
            return Err(ExporterError::Service(format!(
                "service {} is already installed ({})",
                definition.name,
                unit_path.display()
            )));
        }

        std::fs::create_dir_all(&self.unit_dir)?;
        write_unit(&unit_path, &self.render_unit(definition))?;
        log::debug!("Wrote unit file {}", unit_path.display());

        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", &definition.name])?;
        Ok(())
    }

    fn uninstall(&self, name: &str) -> Result<()> {
        let unit_path = self.unit_path(name);
        if !unit_path.exists() {
            return Err(ExporterError::Service(format!(
                "service {} is not installed",
                name
            )));
        }

        if let Err(e) = self.systemctl(&["disable", name]) {
            log::warn!("Could not disable {}: {}", name, e);
        }
        std::fs::remove_file(&unit_path)?;
        self.systemctl(&["daemon-reload"])
    }

    fn start(&self, name: &str) -> Result<()> {
        self.systemctl(&["start", name])
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.systemctl(&["stop", name])
    }

    fn environment_hint(&self) -> String {
        format!("{} (KEY=value lines)", self.environment_file.display())
    }
}

fn write_unit(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|e| {
        ExporterError::Service(format!("failed to write unit file {}: {}", path.display(), e))
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(UNIT_FILE_MODE))?;
    }
    Ok(())
}

/// Quote one `ExecStart=` word
///
/// `%` and `$` are doubled so systemd does not expand them.
fn quote_arg(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("%%"),
            '$' => out.push_str("$$"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingRunner {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<()> {
            let line = format!("{} {}", program, args.join(" "));
            self.calls.lock().unwrap().push(line);
            match self.fail_on {
                Some(verb) if args.first() == Some(&verb) => {
                    Err(ExporterError::Service(format!("{} refused", verb)))
                }
                _ => Ok(()),
            }
        }
    }

    fn manager(dir: &Path, runner: RecordingRunner) -> SystemdManager<RecordingRunner> {
        SystemdManager::with_runner(dir.join("units"), "/etc/avigilon-exporter/environment", runner)
    }

    fn definition() -> ServiceDefinition {
        ServiceDefinition::exporter(
            "/opt/avex/bin/avex".into(),
            vec![
                "exporter".into(),
                "--host".into(),
                "https://acc.local/mt/api/rest/v1".into(),
                "--password".into(),
                "p%ss \"word\"".into(),
            ],
        )
    }

    #[test]
    fn test_render_unit() {
        let dir = tempfile::tempdir().unwrap();
        let unit = manager(dir.path(), RecordingRunner::default()).render_unit(&definition());
        assert!(unit.starts_with("[Unit]\n"));
        assert!(unit.contains(
            "ExecStart=\"/opt/avex/bin/avex\" \"exporter\" \"--host\" \"https://acc.local/mt/api/rest/v1\" \"--password\" \"p%%ss \\\"word\\\"\"\n"
        ));
        assert!(unit.contains("EnvironmentFile=-/etc/avigilon-exporter/environment\n"));
        assert!(unit.contains("Restart=on-failure\n"));
        assert!(unit.contains("WantedBy=multi-user.target\n"));
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("plain"), "\"plain\"");
        assert_eq!(quote_arg("$HOME"), "\"$$HOME\"");
        assert_eq!(quote_arg("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn test_install_writes_unit_and_enables() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), RecordingRunner::default());
        manager.install(&definition()).unwrap();

        let path = manager.unit_path("avigilon-exporter");
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, manager.render_unit(&definition()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o640);
        }

        assert_eq!(
            manager.runner.calls(),
            vec!["systemctl daemon-reload", "systemctl enable avigilon-exporter"]
        );
    }

    #[test]
    fn test_install_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), RecordingRunner::default());
        manager.install(&definition()).unwrap();
        let err = manager.install(&definition()).unwrap_err();
        assert!(err.to_string().contains("already installed"));
    }

    #[test]
    fn test_uninstall_removes_unit_even_if_disable_fails() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner {
            fail_on: Some("disable"),
            ..Default::default()
        };
        let manager = manager(dir.path(), runner);
        manager.install(&definition()).unwrap();
        manager.uninstall("avigilon-exporter").unwrap();

        assert!(!manager.unit_path("avigilon-exporter").exists());
        assert_eq!(
            manager.runner.calls().last().map(String::as_str),
            Some("systemctl daemon-reload")
        );
    }

    #[test]
    fn test_uninstall_missing_service() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), RecordingRunner::default());
        assert!(manager.uninstall("avigilon-exporter").is_err());
        assert!(manager.runner.calls().is_empty());
    }

    #[test]
    fn test_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner {
            fail_on: Some("stop"),
            ..Default::default()
        };
        let manager = manager(dir.path(), runner);
        manager.start("avigilon-exporter").unwrap();
        let err = manager.stop("avigilon-exporter").unwrap_err();
        assert!(err.to_string().contains("stop refused"));
        assert_eq!(
            manager.runner.calls(),
            vec!["systemctl start avigilon-exporter", "systemctl stop avigilon-exporter"]
        );
    }
}
