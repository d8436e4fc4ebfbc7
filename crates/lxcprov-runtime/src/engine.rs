//! Provisioning engine: the create-or-replace state machine per container.
//!
//! For one [`ContainerRecord`] the engine walks
//! `Absent → Defined → NetworkConfigured → GuestFileRewritten → Running →
//! PackagesInstalled`, stopping at the first fatal step. Nothing is rolled
//! back; the next run's reset step clears whatever was left behind.

use std::fmt;

use lxcprov_common::config::ProvisionConfig;
use lxcprov_common::error::{LxcprovError, Result};
use lxcprov_common::types::ContainerRecord;

use crate::backend::{self, ContainerBackend, ContainerHandle, NetworkInterfaceSpec};
use crate::exec::ExecOutput;
use crate::guest_net::NetworkConfigWriter;

/// Step of the provisioning sequence a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Record validation, before any backend call.
    Validate,
    /// Stopping and destroying a previous container of the same name.
    Reset,
    /// Defining the container from its template.
    Define,
    /// Host-side NIC configuration.
    Network,
    /// Guest interfaces file rewrite.
    GuestFile,
    /// Booting the container.
    Start,
    /// Package index update and installation.
    PackageInstall,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validate => "validate",
            Self::Reset => "reset",
            Self::Define => "define",
            Self::Network => "network",
            Self::GuestFile => "guest-file",
            Self::Start => "start",
            Self::PackageInstall => "package-install",
        };
        f.write_str(s)
    }
}

/// Furthest point a container reached during one provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProvisionState {
    /// No fresh container exists yet.
    Absent,
    /// Defined from the template.
    Defined,
    /// Host-side NIC configured and persisted.
    NetworkConfigured,
    /// Guest interfaces file switched to static addressing.
    GuestFileRewritten,
    /// Booted.
    Running,
    /// Packages installed without warnings.
    PackagesInstalled,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Defined => "defined",
            Self::NetworkConfigured => "network-configured",
            Self::GuestFileRewritten => "guest-file-rewritten",
            Self::Running => "running",
            Self::PackagesInstalled => "packages-installed",
        };
        f.write_str(s)
    }
}

/// Result of provisioning one record.
#[derive(Debug)]
pub enum Outcome {
    /// Every step succeeded.
    Success,
    /// The container runs with its network identity, but a package command
    /// exited non-zero.
    SuccessWithPackageWarning {
        /// What went wrong inside the guest.
        detail: String,
    },
    /// Provisioning stopped at `stage`.
    Failed {
        /// Step that failed.
        stage: Stage,
        /// Why it failed.
        cause: LxcprovError,
    },
}

impl Outcome {
    /// Returns whether the container ended up running.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !self.is_failure()
    }

    /// Returns whether provisioning stopped early.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the failed stage, if any.
    #[must_use]
    pub const fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::SuccessWithPackageWarning { detail } => write!(f, "success, packages: {detail}"),
            Self::Failed { stage, cause } => write!(f, "failed at {stage}: {cause}"),
        }
    }
}

/// Everything known about one record after provisioning.
#[derive(Debug)]
pub struct ProvisionReport {
    /// Container name as given in the batch.
    pub name: String,
    /// Furthest state reached.
    pub state: ProvisionState,
    /// Handle of the container created in this run, if any.
    pub container: Option<ContainerHandle>,
    /// Final outcome.
    pub outcome: Outcome,
    /// RFC 3339 timestamp of completion.
    pub finished_at: String,
}

impl ProvisionReport {
    /// Report for a record rejected before reaching the engine.
    #[must_use]
    pub fn rejected(name: impl Into<String>, cause: LxcprovError) -> Self {
        Self {
            name: name.into(),
            state: ProvisionState::Absent,
            container: None,
            outcome: Outcome::Failed {
                stage: Stage::Validate,
                cause,
            },
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A failed step, carried out of [`ProvisioningEngine::drive`].
struct Failure {
    stage: Stage,
    cause: LxcprovError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, Failure>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, Failure> {
        self.map_err(|cause| Failure { stage, cause })
    }
}

/// Drives containers through the provisioning sequence.
///
/// Holds no per-container state between calls; all durable state lives in
/// the backend.
pub struct ProvisioningEngine {
    backend: Box<dyn ContainerBackend>,
    config: ProvisionConfig,
    writer: NetworkConfigWriter,
}

impl ProvisioningEngine {
    /// Creates an engine on the LXC backend described by `config`.
    #[must_use]
    pub fn new(config: ProvisionConfig) -> Self {
        Self::with_backend(backend::lxc_backend(&config), config)
    }

    /// Creates an engine on an explicit backend.
    #[must_use]
    pub fn with_backend(backend: Box<dyn ContainerBackend>, config: ProvisionConfig) -> Self {
        let writer = NetworkConfigWriter::new(config.guest_network.clone());
        Self {
            backend,
            config,
            writer,
        }
    }

    /// Returns whether the backend is operational on this host.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Provisions one container, replacing any existing one of that name.
    pub fn provision(&self, record: &ContainerRecord) -> ProvisionReport {
        let name = record.name.as_str();
        let mut state = ProvisionState::Absent;
        let mut container = None;

        let outcome = match self.drive(record, &mut state, &mut container) {
            Ok(warnings) if warnings.is_empty() => {
                tracing::info!(name, "container provisioned");
                Outcome::Success
            }
            Ok(warnings) => {
                let detail = warnings.join("; ");
                tracing::warn!(name, %detail, "container running with package warnings");
                Outcome::SuccessWithPackageWarning { detail }
            }
            Err(Failure { stage, cause }) => {
                tracing::error!(name, %stage, %state, error = %cause, "provisioning failed");
                Outcome::Failed { stage, cause }
            }
        };

        ProvisionReport {
            name: record.name.clone(),
            state,
            container,
            outcome,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Runs every step, returning package warnings on success.
    fn drive(
        &self,
        record: &ContainerRecord,
        state: &mut ProvisionState,
        container: &mut Option<ContainerHandle>,
    ) -> std::result::Result<Vec<String>, Failure> {
        let name = record.name.as_str();

        self.reset(name).at(Stage::Reset)?;

        tracing::info!(name, template = %self.config.template, "defining container");
        let created = self
            .backend
            .create(name, &self.config.template)
            .at(Stage::Define)?;
        let handle = container.insert(created);
        *state = ProvisionState::Defined;

        self.configure_network(record, handle).at(Stage::Network)?;
        *state = ProvisionState::NetworkConfigured;

        let guest_file = self
            .backend
            .rootfs_path(name)
            .join(&self.config.guest_interfaces_path);
        tracing::info!(name, path = %guest_file.display(), "switching guest to static addressing");
        self.writer
            .rewrite(&guest_file, record.ipv4_addr)
            .at(Stage::GuestFile)?;
        *state = ProvisionState::GuestFileRewritten;

        tracing::info!(name, "starting container");
        self.backend.start(handle).at(Stage::Start)?;
        *state = ProvisionState::Running;

        let warnings = self
            .install_packages(handle, &record.package_list)
            .at(Stage::PackageInstall)?;
        if warnings.is_empty() {
            *state = ProvisionState::PackagesInstalled;
        }
        Ok(warnings)
    }

    /// Clears out a previous container of the same name.
    fn reset(&self, name: &str) -> Result<()> {
        if !self.backend.exists(name) {
            tracing::debug!(name, "no previous container");
            return Ok(());
        }
        tracing::info!(name, "replacing existing container");
        self.backend.stop(name)?;
        self.backend.destroy(name)
    }

    fn configure_network(&self, record: &ContainerRecord, handle: &ContainerHandle) -> Result<()> {
        let nic = NetworkInterfaceSpec::veth(record, &self.config.bridge, self.config.ipv4_prefix);
        let guest_gateway = self.writer.defaults().gateway;
        if nic.ipv4_gateway != guest_gateway {
            tracing::warn!(
                name = %record.name,
                host_gateway = %nic.ipv4_gateway,
                %guest_gateway,
                "host-side NIC gateway differs from the guest file gateway"
            );
        }

        tracing::info!(
            name = %record.name,
            bridge = %nic.link,
            ipv4 = %nic.ipv4,
            "configuring host network"
        );
        self.backend.reset_network_config(handle)?;
        self.backend.configure_interface(handle, &nic)?;
        self.backend.persist_config(handle)
    }

    /// Updates the package index and installs `packages`.
    ///
    /// Non-zero exits become warnings; only an unreachable guest or an
    /// expired timeout is an error.
    fn install_packages(
        &self,
        handle: &ContainerHandle,
        packages: &[String],
    ) -> Result<Vec<String>> {
        let timeout = self.config.guest_command_timeout();
        let commands = &self.config.packages;
        let mut warnings = Vec::new();

        let update = self
            .backend
            .run_in_guest(handle, &commands.update_command, timeout)?;
        if !update.success() {
            warnings.push(describe("package index update", &update));
        }

        if packages.is_empty() {
            tracing::debug!(name = handle.name(), "no packages requested");
            return Ok(warnings);
        }

        let mut argv = commands.install_command.clone();
        argv.extend(packages.iter().cloned());
        let install = self.backend.run_in_guest(handle, &argv, timeout)?;
        if !install.success() {
            warnings.push(describe(&format!("install of {}", packages.join(" ")), &install));
        }
        Ok(warnings)
    }
}

fn describe(what: &str, output: &ExecOutput) -> String {
    let tail = output.stderr_tail();
    if tail.is_empty() {
        format!("{what} exited with {}", output.exit_code)
    } else {
        format!("{what} exited with {}: {tail}", output.exit_code)
    }
}
