//! Deployment configuration for a provisioning run.
//!
//! Every field has a default taken from [`crate::constants`], so a config
//! file only needs to name the values it overrides.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{LxcprovError, Result};

/// Root configuration for a provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Directory holding one subdirectory per container.
    pub lxc_path: PathBuf,
    /// Template used by `create`.
    pub template: String,
    /// Host bridge the veth is linked to.
    pub bridge: String,
    /// Prefix length of the host-side NIC address.
    pub ipv4_prefix: u8,
    /// Guest interfaces file, relative to the rootfs.
    pub guest_interfaces_path: PathBuf,
    /// Values of the static block written into the guest file.
    pub guest_network: GuestNetworkDefaults,
    /// Package manager commands run inside the guest.
    pub packages: PackageCommands,
    /// Time budget per in-guest command; `None` waits forever.
    pub guest_command_timeout_secs: Option<u64>,
}

impl ProvisionConfig {
    /// Loads a configuration file, filling absent fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`ProvisionConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading provisioning config");
        let content = std::fs::read_to_string(path).map_err(|e| LxcprovError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot constrain on its own.
    ///
    /// # Errors
    ///
    /// Returns [`LxcprovError::Config`] on the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.template.is_empty() {
            return Err(config_error("template must not be empty"));
        }
        if self.bridge.is_empty() {
            return Err(config_error("bridge must not be empty"));
        }
        if self.ipv4_prefix > 32 {
            return Err(config_error(format!(
                "ipv4_prefix {} is out of range (0-32)",
                self.ipv4_prefix
            )));
        }
        if self.guest_interfaces_path.is_absolute() {
            return Err(config_error(
                "guest_interfaces_path must be relative to the container rootfs",
            ));
        }
        if self.packages.update_command.is_empty() {
            return Err(config_error("packages.update_command must not be empty"));
        }
        if self.packages.install_command.is_empty() {
            return Err(config_error("packages.install_command must not be empty"));
        }
        if self.guest_command_timeout_secs == Some(0) {
            return Err(config_error("guest_command_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Returns the in-guest command timeout as a [`Duration`].
    #[must_use]
    pub fn guest_command_timeout(&self) -> Option<Duration> {
        self.guest_command_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            lxc_path: PathBuf::from(constants::DEFAULT_LXC_PATH),
            template: constants::DEFAULT_TEMPLATE.to_string(),
            bridge: constants::DEFAULT_BRIDGE.to_string(),
            ipv4_prefix: constants::DEFAULT_IPV4_PREFIX,
            guest_interfaces_path: PathBuf::from(constants::GUEST_INTERFACES_PATH),
            guest_network: GuestNetworkDefaults::default(),
            packages: PackageCommands::default(),
            guest_command_timeout_secs: Some(constants::DEFAULT_GUEST_COMMAND_TIMEOUT_SECS),
        }
    }
}

/// Fixed addressing written into every guest's static block.
///
/// `gateway` here is the guest's default route. It is deliberately kept
/// apart from the per-record gateway configured on the host-side NIC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuestNetworkDefaults {
    /// Netmask line.
    pub netmask: Ipv4Addr,
    /// Network line.
    pub network: Ipv4Addr,
    /// Broadcast line.
    pub broadcast: Ipv4Addr,
    /// Gateway line.
    pub gateway: Ipv4Addr,
}

impl Default for GuestNetworkDefaults {
    fn default() -> Self {
        Self {
            netmask: constants::GUEST_NETMASK,
            network: constants::GUEST_NETWORK,
            broadcast: constants::GUEST_BROADCAST,
            gateway: constants::GUEST_GATEWAY,
        }
    }
}

/// Package manager invocations run inside the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageCommands {
    /// Refreshes the package index.
    pub update_command: Vec<String>,
    /// Installs packages; the package list is appended.
    pub install_command: Vec<String>,
}

impl Default for PackageCommands {
    fn default() -> Self {
        Self {
            update_command: to_argv(constants::PACKAGE_UPDATE_COMMAND),
            install_command: to_argv(constants::PACKAGE_INSTALL_COMMAND),
        }
    }
}

fn to_argv(words: &[&str]) -> Vec<String> {
    words.iter().map(ToString::to_string).collect()
}

fn config_error(message: impl Into<String>) -> LxcprovError {
    LxcprovError::Config {
        message: message.into(),
    }
}
