//! LXC backend driving the `lxc-*` userspace tools.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use lxcprov_common::constants::{LXC_CONFIG_FILE, LXC_ROOTFS_DIR};
use lxcprov_common::error::{LxcprovError, Result};
use lxcprov_common::types::HandleState;

use super::lxc_config::LxcConfig;
use super::{ContainerBackend, ContainerHandle, NetworkInterfaceSpec};
use crate::exec::{self, Completion, ExecOutput};

/// Where the kernel lists network devices, bridges included.
const SYS_CLASS_NET: &str = "/sys/class/net";

/// Seconds `lxc-wait` allows a booting container to reach `RUNNING`.
const START_WAIT_SECS: u32 = 60;

/// Run state reported by `lxc-info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LxcState {
    /// The container is up.
    Running,
    /// The container is down.
    Stopped,
    /// Any transitional state (`STARTING`, `STOPPING`, `FROZEN`, ...).
    Other(String),
}

/// Backend that shells out to the LXC tools under one LXC path.
///
/// Network changes are staged in memory between
/// [`reset_network_config`](ContainerBackend::reset_network_config) and
/// [`persist_config`](ContainerBackend::persist_config), then written to
/// the container's `config` file in one go.
#[derive(Debug)]
pub struct LxcBackend {
    lxc_path: PathBuf,
    sys_class_net: PathBuf,
    pending: Mutex<HashMap<String, LxcConfig>>,
}

impl LxcBackend {
    /// Creates a backend rooted at `lxc_path`.
    #[must_use]
    pub fn new(lxc_path: impl Into<PathBuf>) -> Self {
        Self {
            lxc_path: lxc_path.into(),
            sys_class_net: PathBuf::from(SYS_CLASS_NET),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the directory probed for host bridges.
    #[must_use]
    pub fn with_sys_class_net(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sys_class_net = dir.into();
        self
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.lxc_path.join(name).join(LXC_CONFIG_FILE)
    }

    /// Queries the run state of `name` with `lxc-info`.
    ///
    /// # Errors
    ///
    /// Returns an error if `lxc-info` fails or prints no state.
    pub fn state(&self, name: &str) -> Result<LxcState> {
        let output = self.tool("info", name, "lxc-info", &["-s"])?;
        parse_state(&output.stdout).ok_or_else(|| {
            LxcprovError::backend("info", name, format!("no state in {:?}", output.stdout))
        })
    }

    /// Runs an LXC tool against `name`; a non-zero exit is a backend error.
    fn tool(
        &self,
        op: &'static str,
        name: &str,
        program: &str,
        args: &[&str],
    ) -> Result<ExecOutput> {
        let mut cmd = self.command(program, name);
        let _ = cmd.args(args);
        match exec::run(&mut cmd, None) {
            Ok(Completion::Finished(output)) if output.success() => Ok(output),
            Ok(Completion::Finished(output)) => Err(LxcprovError::backend(
                op,
                name,
                format!(
                    "{program} exited with {}: {}",
                    output.exit_code,
                    output.stderr_tail()
                ),
            )),
            Ok(Completion::TimedOut) => {
                Err(LxcprovError::backend(op, name, format!("{program} timed out")))
            }
            Err(e) => Err(LxcprovError::backend(op, name, format!("failed to run {program}: {e}"))),
        }
    }

    fn command(&self, program: &str, name: &str) -> Command {
        let mut cmd = Command::new(program);
        let _ = cmd.arg("-P").arg(&self.lxc_path).arg("-n").arg(name);
        cmd
    }

    fn pending(
        &self,
        op: &'static str,
        name: &str,
    ) -> Result<MutexGuard<'_, HashMap<String, LxcConfig>>> {
        self.pending
            .lock()
            .map_err(|_| LxcprovError::backend(op, name, "pending configuration lock poisoned"))
    }

    fn load_config(&self, op: &'static str, name: &str) -> Result<LxcConfig> {
        LxcConfig::load(&self.config_path(name))
            .map_err(|e| LxcprovError::backend(op, name, e.to_string()))
    }
}

impl ContainerBackend for LxcBackend {
    fn exists(&self, name: &str) -> bool {
        self.config_path(name).is_file()
    }

    fn stop(&self, name: &str) -> Result<()> {
        if self.state(name)? == LxcState::Stopped {
            tracing::debug!(name, "container already stopped");
            return Ok(());
        }
        tracing::info!(name, "stopping container");
        let _ = self.tool("stop", name, "lxc-stop", &[])?;
        Ok(())
    }

    fn destroy(&self, name: &str) -> Result<()> {
        if self.state(name)? == LxcState::Running {
            return Err(LxcprovError::backend(
                "destroy",
                name,
                "container is still running",
            ));
        }
        tracing::info!(name, "destroying container");
        let _ = self.tool("destroy", name, "lxc-destroy", &[])?;
        let _ = self.pending("destroy", name)?.remove(name);
        Ok(())
    }

    fn create(&self, name: &str, template: &str) -> Result<ContainerHandle> {
        tracing::info!(name, template, "creating container");
        let _ = self.tool("create", name, "lxc-create", &["-t", template])?;
        Ok(ContainerHandle::new(name, HandleState::DefinedStopped))
    }

    fn reset_network_config(&self, handle: &ContainerHandle) -> Result<()> {
        let name = handle.name();
        let mut config = self.load_config("reset network", name)?;
        let removed = config.clear_network();
        tracing::debug!(name, removed, "cleared inherited network configuration");
        let _ = self
            .pending("reset network", name)?
            .insert(name.to_string(), config);
        Ok(())
    }

    fn configure_interface(
        &self,
        handle: &ContainerHandle,
        spec: &NetworkInterfaceSpec,
    ) -> Result<()> {
        let name = handle.name();
        if !self.sys_class_net.join(&spec.link).exists() {
            return Err(LxcprovError::backend(
                "configure interface",
                name,
                format!("bridge {} is not available", spec.link),
            ));
        }

        let mut pending = self.pending("configure interface", name)?;
        if !pending.contains_key(name) {
            let config = self.load_config("configure interface", name)?;
            let _ = pending.insert(name.to_string(), config);
        }
        if let Some(config) = pending.get_mut(name) {
            apply_interface(config, spec);
        }
        tracing::debug!(
            name,
            link = %spec.link,
            ipv4 = %spec.ipv4,
            hwaddr = %spec.hwaddr,
            "interface staged"
        );
        Ok(())
    }

    fn persist_config(&self, handle: &ContainerHandle) -> Result<()> {
        let name = handle.name();
        let Some(config) = self.pending("persist config", name)?.remove(name) else {
            tracing::debug!(name, "no staged configuration to persist");
            return Ok(());
        };
        config
            .save(&self.config_path(name))
            .map_err(|e| LxcprovError::backend("persist config", name, e.to_string()))?;
        tracing::debug!(name, "configuration persisted");
        Ok(())
    }

    fn rootfs_path(&self, name: &str) -> PathBuf {
        LxcConfig::load(&self.config_path(name))
            .ok()
            .and_then(|c| c.get("lxc.rootfs.path").and_then(dir_rootfs))
            .unwrap_or_else(|| self.lxc_path.join(name).join(LXC_ROOTFS_DIR))
    }

    fn start(&self, handle: &mut ContainerHandle) -> Result<()> {
        let name = handle.name().to_string();
        tracing::info!(name = %name, "starting container");
        let _ = self.tool("start", &name, "lxc-start", &["-d"])?;
        let timeout = START_WAIT_SECS.to_string();
        let _ = self.tool("start", &name, "lxc-wait", &["-s", "RUNNING", "-t", timeout.as_str()])?;
        handle.set_state(HandleState::DefinedRunning);
        Ok(())
    }

    fn run_in_guest(
        &self,
        handle: &ContainerHandle,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> Result<ExecOutput> {
        let name = handle.name();
        if argv.is_empty() {
            return Err(LxcprovError::backend("attach", name, "empty command"));
        }
        if self.state(name)? != LxcState::Running {
            return Err(LxcprovError::backend("attach", name, "guest is not running"));
        }

        tracing::info!(name, cmd = ?argv, "running command in guest");
        let mut cmd = self.command("lxc-attach", name);
        let _ = cmd.arg("--").args(argv);
        match exec::run(&mut cmd, timeout) {
            Ok(Completion::Finished(output)) => Ok(output),
            Ok(Completion::TimedOut) => Err(LxcprovError::Timeout {
                name: name.to_string(),
                command: argv.to_vec(),
                after: timeout.unwrap_or_default(),
            }),
            Err(e) => Err(LxcprovError::backend(
                "attach",
                name,
                format!("failed to run lxc-attach: {e}"),
            )),
        }
    }

    fn is_available(&self) -> bool {
        which::which("lxc-create").is_ok()
    }
}

fn apply_interface(config: &mut LxcConfig, spec: &NetworkInterfaceSpec) {
    config.push("lxc.net.0.type", spec.kind);
    if spec.up {
        config.push("lxc.net.0.flags", "up");
    }
    config.push("lxc.net.0.link", &spec.link);
    config.push("lxc.net.0.hwaddr", spec.hwaddr);
    config.push(
        "lxc.net.0.ipv4.address",
        format!("{}/{}", spec.ipv4, spec.ipv4_prefix),
    );
    config.push("lxc.net.0.ipv4.gateway", spec.ipv4_gateway);
}

/// Extracts a host path from an `lxc.rootfs.path` value of a directory rootfs.
fn dir_rootfs(value: &str) -> Option<PathBuf> {
    let path = value.strip_prefix("dir:").unwrap_or(value);
    path.starts_with('/').then(|| PathBuf::from(path))
}

/// Parses the `State:` line printed by `lxc-info -s`.
fn parse_state(stdout: &str) -> Option<LxcState> {
    stdout.lines().find_map(|line| {
        let value = line.trim().strip_prefix("State:")?.trim();
        Some(match value {
            "RUNNING" => LxcState::Running,
            "STOPPED" => LxcState::Stopped,
            other => LxcState::Other(other.to_string()),
        })
    })
}
