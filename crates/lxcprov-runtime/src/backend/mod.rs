//! Container backend abstraction.
//!
//! The provisioning engine only ever talks to a [`ContainerBackend`]; the
//! LXC tooling is one implementation of it.

pub mod lxc;
pub mod lxc_config;

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use lxcprov_common::config::ProvisionConfig;
use lxcprov_common::error::Result;
use lxcprov_common::types::{ContainerRecord, HandleState, MacAddr};

use crate::exec::ExecOutput;

/// Backend-side reference to a container, obtained from [`ContainerBackend::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    name: String,
    state: HandleState,
}

impl ContainerHandle {
    /// Creates a handle. Meant for backend implementations only.
    #[must_use]
    pub fn new(name: impl Into<String>, state: HandleState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    /// Returns the container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the last known backend state.
    #[must_use]
    pub const fn state(&self) -> HandleState {
        self.state
    }

    /// Records a state transition observed by the backend.
    pub const fn set_state(&mut self, state: HandleState) {
        self.state = state;
    }
}

/// Kind of virtual NIC attached to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceKind {
    /// Virtual ethernet pair linked to a host bridge.
    Veth,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Veth => write!(f, "veth"),
        }
    }
}

/// Host-side configuration of the container's single NIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterfaceSpec {
    /// NIC type.
    pub kind: InterfaceKind,
    /// Whether the link is brought up administratively.
    pub up: bool,
    /// Host bridge the NIC is linked to.
    pub link: String,
    /// Static address of the NIC.
    pub ipv4: Ipv4Addr,
    /// Prefix length of `ipv4`.
    pub ipv4_prefix: u8,
    /// Default gateway configured on the NIC.
    pub ipv4_gateway: Ipv4Addr,
    /// Hardware address of the NIC.
    pub hwaddr: MacAddr,
}

impl NetworkInterfaceSpec {
    /// Builds the veth NIC for `record`, linked to `bridge`.
    #[must_use]
    pub fn veth(record: &ContainerRecord, bridge: &str, ipv4_prefix: u8) -> Self {
        Self {
            kind: InterfaceKind::Veth,
            up: true,
            link: bridge.to_string(),
            ipv4: record.ipv4_addr,
            ipv4_prefix,
            ipv4_gateway: record.gateway_ipv4,
            hwaddr: record.mac_addr,
        }
    }
}

/// Operations the provisioning engine needs from a container runtime.
///
/// Every operation addresses a container by name, either directly or
/// through a [`ContainerHandle`]. Calls block until the runtime is done.
pub trait ContainerBackend: Send + Sync {
    /// Returns whether a definition exists for `name`, in any state.
    fn exists(&self, name: &str) -> bool;

    /// Stops a running container. Stopping a stopped container is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime fails to stop the container.
    fn stop(&self, name: &str) -> Result<()>;

    /// Removes a defined container and its storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is still running or removal fails.
    fn destroy(&self, name: &str) -> Result<()>;

    /// Defines a fresh container from `template`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template or resources are unavailable.
    fn create(&self, name: &str, template: &str) -> Result<ContainerHandle>;

    /// Clears any inherited network interface configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the container configuration cannot be loaded.
    fn reset_network_config(&self, handle: &ContainerHandle) -> Result<()>;

    /// Attaches and configures exactly one virtual NIC.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge is unavailable.
    fn configure_interface(
        &self,
        handle: &ContainerHandle,
        spec: &NetworkInterfaceSpec,
    ) -> Result<()>;

    /// Durably commits pending configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    fn persist_config(&self, handle: &ContainerHandle) -> Result<()>;

    /// Returns the host path of the container's root filesystem.
    fn rootfs_path(&self, name: &str) -> PathBuf;

    /// Boots the container and marks the handle running.
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to boot.
    fn start(&self, handle: &mut ContainerHandle) -> Result<()>;

    /// Runs `argv` inside the running guest and waits for it.
    ///
    /// A non-zero exit of the command is reported through
    /// [`ExecOutput::exit_code`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the guest is unreachable, or a timeout error if
    /// `timeout` expires first.
    fn run_in_guest(
        &self,
        handle: &ContainerHandle,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> Result<ExecOutput>;

    /// Returns whether this backend is operational on the current host.
    fn is_available(&self) -> bool;
}

/// Creates the LXC backend described by `config`.
#[must_use]
pub fn lxc_backend(config: &ProvisionConfig) -> Box<dyn ContainerBackend> {
    Box::new(lxc::LxcBackend::new(config.lxc_path.clone()))
}

/// Returns whether the current process has root privileges.
///
/// LXC needs them to create privileged containers under the system path.
#[must_use]
pub fn running_as_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ContainerRecord {
        ContainerRecord {
            name: "web1".into(),
            mac_addr: MacAddr::new([0x00, 0x16, 0x3e, 0xaa, 0xbb, 0xcc]),
            ipv4_addr: Ipv4Addr::new(192, 168, 0, 10),
            gateway_ipv4: Ipv4Addr::new(192, 168, 1, 254),
            package_list: vec![],
        }
    }

    #[test]
    fn veth_spec_takes_addressing_from_record() {
        let spec = NetworkInterfaceSpec::veth(&record(), "lxcbr0", 24);
        assert_eq!(spec.kind, InterfaceKind::Veth);
        assert!(spec.up);
        assert_eq!(spec.link, "lxcbr0");
        assert_eq!(spec.ipv4, Ipv4Addr::new(192, 168, 0, 10));
        assert_eq!(spec.ipv4_gateway, Ipv4Addr::new(192, 168, 1, 254));
        assert_eq!(spec.hwaddr.to_string(), "00:16:3e:aa:bb:cc");
    }

    #[test]
    fn handle_tracks_state_changes() {
        let mut handle = ContainerHandle::new("web1", HandleState::DefinedStopped);
        handle.set_state(HandleState::DefinedRunning);
        assert_eq!(handle.name(), "web1");
        assert_eq!(handle.state(), HandleState::DefinedRunning);
    }

    #[test]
    fn lxc_backend_uses_configured_path() {
        let config = ProvisionConfig {
            lxc_path: PathBuf::from("/srv/lxc"),
            ..ProvisionConfig::default()
        };
        let backend = lxc_backend(&config);
        assert_eq!(backend.rootfs_path("web1"), PathBuf::from("/srv/lxc/web1/rootfs"));
    }
}
