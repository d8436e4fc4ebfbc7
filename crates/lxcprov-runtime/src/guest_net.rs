//! Rewriting of the guest's network interfaces file to static addressing.
//!
//! [`NetworkConfigWriter::render`] is a pure text transform;
//! [`NetworkConfigWriter::rewrite`] wraps it with the file round trip.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{Read, Seek, Write};
use std::net::Ipv4Addr;
use std::path::Path;

use lxcprov_common::config::GuestNetworkDefaults;
use lxcprov_common::error::{LxcprovError, Result};

/// Addressing method keyword replaced in the guest file.
pub const DYNAMIC_KEYWORD: &str = "dhcp";

/// Keyword written in its place.
pub const STATIC_KEYWORD: &str = "static";

/// Turns a DHCP interfaces file into a static one.
#[derive(Debug, Clone)]
pub struct NetworkConfigWriter {
    defaults: GuestNetworkDefaults,
}

impl NetworkConfigWriter {
    /// Creates a writer that fills the static block from `defaults`.
    #[must_use]
    pub const fn new(defaults: GuestNetworkDefaults) -> Self {
        Self { defaults }
    }

    /// Returns the values used for the static block.
    #[must_use]
    pub const fn defaults(&self) -> &GuestNetworkDefaults {
        &self.defaults
    }

    /// Computes the new file content for `address`.
    ///
    /// Every `dhcp` becomes `static` and a static block is appended. The
    /// transform is not idempotent: applying it twice appends two blocks.
    #[must_use]
    pub fn render(&self, current: &str, address: Ipv4Addr) -> String {
        let mut out = current.replace(DYNAMIC_KEYWORD, STATIC_KEYWORD);
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.static_block(address));
        out
    }

    /// Returns the indented block appended under the interface stanza.
    #[must_use]
    pub fn static_block(&self, address: Ipv4Addr) -> String {
        let GuestNetworkDefaults {
            netmask,
            network,
            broadcast,
            gateway,
        } = &self.defaults;
        let mut block = String::new();
        for (key, value) in [
            ("address", address),
            ("netmask", *netmask),
            ("network", *network),
            ("broadcast", *broadcast),
            ("gateway", *gateway),
        ] {
            let _ = writeln!(block, "    {key} {value}");
        }
        block
    }

    /// Rewrites the file at `path` in place.
    ///
    /// The whole file is read, transformed, written back from the start,
    /// and truncated to the new length.
    ///
    /// # Errors
    ///
    /// Returns [`LxcprovError::GuestFile`] if any step of the round trip fails.
    pub fn rewrite(&self, path: &Path, address: Ipv4Addr) -> Result<()> {
        let guest_err = |source: std::io::Error| LxcprovError::GuestFile {
            path: path.to_path_buf(),
            source,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(guest_err)?;
        let mut current = String::new();
        let _ = file.read_to_string(&mut current).map_err(guest_err)?;

        let updated = self.render(&current, address);
        file.rewind().map_err(guest_err)?;
        file.write_all(updated.as_bytes()).map_err(guest_err)?;
        let end = file.stream_position().map_err(guest_err)?;
        file.set_len(end).map_err(guest_err)?;

        tracing::debug!(path = %path.display(), %address, "guest interfaces file rewritten");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBIAN_DEFAULT: &str = "\
auto lo
iface lo inet loopback

auto eth0
iface eth0 inet dhcp
";

    fn writer() -> NetworkConfigWriter {
        NetworkConfigWriter::new(GuestNetworkDefaults::default())
    }

    #[test]
    fn dhcp_becomes_static_with_block() {
        let out = writer().render(DEBIAN_DEFAULT, Ipv4Addr::new(192, 168, 0, 10));
        assert!(!out.contains("dhcp"));
        assert!(out.contains("iface eth0 inet static\n    address 192.168.0.10\n"));
        assert!(out.ends_with(concat!(
            "    address 192.168.0.10\n",
            "    netmask 255.255.255.0\n",
            "    network 192.168.0.0\n",
            "    broadcast 192.168.0.255\n",
            "    gateway 192.168.0.254\n",
        )));
    }

    #[test]
    fn every_dhcp_occurrence_is_replaced() {
        let text = "iface eth0 inet dhcp\niface eth1 inet dhcp\n# dhcp fallback\n";
        let out = writer().render(text, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(out.matches("dhcp").count(), 0);
        assert_eq!(out.matches("static").count(), 3);
    }

    #[test]
    fn second_application_appends_duplicate_block() {
        let w = writer();
        let address = Ipv4Addr::new(192, 168, 0, 10);
        let once = w.render(DEBIAN_DEFAULT, address);
        let twice = w.render(&once, address);
        assert_ne!(once, twice);
        assert_eq!(twice.matches("address 192.168.0.10").count(), 2);
    }

    #[test]
    fn missing_trailing_newline_is_added_before_block() {
        let out = writer().render("iface eth0 inet dhcp", Ipv4Addr::new(192, 168, 0, 10));
        assert!(out.starts_with("iface eth0 inet static\n    address"));
    }

    #[test]
    fn empty_input_yields_only_block() {
        let out = writer().render("", Ipv4Addr::new(192, 168, 0, 10));
        assert!(out.starts_with("    address 192.168.0.10\n"));
    }

    #[test]
    fn guest_gateway_ignores_host_side_gateway() {
        let w = NetworkConfigWriter::new(GuestNetworkDefaults {
            gateway: Ipv4Addr::new(10, 1, 1, 1),
            ..GuestNetworkDefaults::default()
        });
        let out = w.render(DEBIAN_DEFAULT, Ipv4Addr::new(192, 168, 0, 10));
        assert!(out.contains("    gateway 10.1.1.1\n"));
        assert!(!out.contains("192.168.0.254"));
    }

    #[test]
    fn rewrite_writes_exactly_the_rendered_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("interfaces");
        let padded = format!("{DEBIAN_DEFAULT}{}", "#".repeat(4096));
        std::fs::write(&path, &padded).expect("write");

        let w = NetworkConfigWriter::new(GuestNetworkDefaults::default());
        let address = Ipv4Addr::new(192, 168, 0, 10);
        w.rewrite(&path, address).expect("rewrite");

        let on_disk = std::fs::read_to_string(&path).expect("read");
        assert_eq!(on_disk, w.render(&padded, address));
    }

    #[test]
    fn rewrite_replaces_file_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("interfaces");
        std::fs::write(&path, DEBIAN_DEFAULT).expect("write");

        writer()
            .rewrite(&path, Ipv4Addr::new(192, 168, 0, 10))
            .expect("rewrite");

        let on_disk = std::fs::read_to_string(&path).expect("read");
        assert!(on_disk.contains("iface eth0 inet static"));
        assert!(on_disk.contains("address 192.168.0.10"));
    }

    #[test]
    fn rewrite_missing_file_is_guest_file_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = writer().rewrite(&dir.path().join("absent"), Ipv4Addr::new(192, 168, 0, 10));
        assert!(matches!(result, Err(LxcprovError::GuestFile { .. })));
    }
}
