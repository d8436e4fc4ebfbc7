//! System-wide constants and default paths.

use std::net::Ipv4Addr;

/// Default directory where LXC keeps one subdirectory per container.
pub const DEFAULT_LXC_PATH: &str = "/var/lib/lxc";

/// Template used to define fresh containers.
pub const DEFAULT_TEMPLATE: &str = "debian";

/// Host bridge the container's veth is attached to.
pub const DEFAULT_BRIDGE: &str = "lxcbr0";

/// Prefix length written next to the host-side NIC address.
pub const DEFAULT_IPV4_PREFIX: u8 = 24;

/// Guest network interfaces file, relative to the container rootfs.
pub const GUEST_INTERFACES_PATH: &str = "etc/network/interfaces";

/// Netmask written into the guest static block.
pub const GUEST_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
/// Network written into the guest static block.
pub const GUEST_NETWORK: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 0);
/// Broadcast address written into the guest static block.
pub const GUEST_BROADCAST: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 255);
/// Default route written into the guest static block.
///
/// Independent from the per-record gateway configured on the host-side NIC.
pub const GUEST_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 254);

/// Command that refreshes the guest's package index.
pub const PACKAGE_UPDATE_COMMAND: &[&str] = &["apt-get", "update"];

/// Command prefix that installs packages; package names are appended.
pub const PACKAGE_INSTALL_COMMAND: &[&str] = &["apt-get", "-y", "install"];

/// Upper bound for a single in-guest command, in seconds.
pub const DEFAULT_GUEST_COMMAND_TIMEOUT_SECS: u64 = 30 * 60;

/// File name of a container's LXC configuration inside its directory.
pub const LXC_CONFIG_FILE: &str = "config";

/// Directory name of a container's root filesystem inside its directory.
pub const LXC_ROOTFS_DIR: &str = "rootfs";

/// Environment variable naming an optional configuration file.
pub const CONFIG_ENV: &str = "LXCPROV_CONFIG";
