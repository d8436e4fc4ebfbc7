//! Domain types: batch records, link-layer addresses, and container state.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LxcprovError, Result};

/// One entry of a batch file, exactly as it appears on the wire.
///
/// Every field is required; unknown fields are ignored. Nothing is
/// validated beyond the JSON shape; see [`ContainerRecord`] for that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSpec {
    /// Container name.
    pub name: String,
    /// Link-layer address of the container's NIC.
    pub mac_addr: String,
    /// Static address assigned to the NIC.
    pub ipv4_addr: String,
    /// Gateway configured on the host-side NIC.
    pub ipv4_gw: String,
    /// Packages to install inside the guest.
    pub pkg_list: Vec<String>,
}

/// Reads a batch file: a JSON array of [`RecordSpec`] objects.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a JSON array, or an
/// entry is missing a required field.
pub fn load_records(path: &Path) -> Result<Vec<RecordSpec>> {
    tracing::debug!(path = %path.display(), "loading batch file");
    let content = std::fs::read_to_string(path).map_err(|e| LxcprovError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let records: Vec<RecordSpec> = serde_json::from_str(&content)?;
    tracing::info!(path = %path.display(), count = records.len(), "batch file loaded");
    Ok(records)
}

/// Validated description of one desired container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Backend identity key.
    pub name: String,
    /// Hardware address of the single veth NIC.
    pub mac_addr: MacAddr,
    /// Static address of the NIC.
    pub ipv4_addr: Ipv4Addr,
    /// Gateway configured on the host-side NIC.
    pub gateway_ipv4: Ipv4Addr,
    /// Packages to install, in order. May be empty.
    pub package_list: Vec<String>,
}

impl TryFrom<&RecordSpec> for ContainerRecord {
    type Error = LxcprovError;

    fn try_from(spec: &RecordSpec) -> Result<Self> {
        validate_name(&spec.name)?;
        let mac_addr = spec.mac_addr.parse()?;
        let ipv4_addr = parse_ipv4("ipv4_addr", &spec.ipv4_addr)?;
        let gateway_ipv4 = parse_ipv4("ipv4_gw", &spec.ipv4_gw)?;
        for pkg in &spec.pkg_list {
            validate_package(pkg)?;
        }
        Ok(Self {
            name: spec.name.clone(),
            mac_addr,
            ipv4_addr,
            gateway_ipv4,
            package_list: spec.pkg_list.clone(),
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    let reject = |reason: &str| -> Result<()> {
        Err(LxcprovError::Validation {
            field: "name",
            value: name.to_string(),
            reason: reason.to_string(),
        })
    };
    if name.is_empty() {
        return reject("must not be empty");
    }
    if name.starts_with(['-', '.']) {
        return reject("must not start with '-' or '.'");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return reject("only ASCII letters, digits, '-', '_' and '.' are allowed");
    }
    Ok(())
}

fn parse_ipv4(field: &'static str, value: &str) -> Result<Ipv4Addr> {
    value.parse().map_err(|e: std::net::AddrParseError| LxcprovError::Validation {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

const PACKAGE_NAME_RULE: &str =
    "package names must be non-empty, contain no whitespace, and not start with '-'";

fn validate_package(pkg: &str) -> Result<()> {
    if pkg.is_empty() || pkg.starts_with('-') || pkg.chars().any(char::is_whitespace) {
        return Err(LxcprovError::Validation {
            field: "pkg_list",
            value: pkg.to_string(),
            reason: PACKAGE_NAME_RULE.into(),
        });
    }
    Ok(())
}

/// A 48-bit link-layer address, rendered as lower-case colon-separated hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Creates an address from raw octets.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Returns the raw octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = LxcprovError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| LxcprovError::Validation {
            field: "mac_addr",
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(invalid("expected six colon-separated octets"));
        }
        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid("each octet must be two hex digits"));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| invalid("bad hex octet"))?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Backend-side lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// No definition exists for the name.
    Undefined,
    /// Defined on disk but not running.
    DefinedStopped,
    /// Defined and booted.
    DefinedRunning,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::DefinedStopped => write!(f, "stopped"),
            Self::DefinedRunning => write!(f, "running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web1() -> RecordSpec {
        RecordSpec {
            name: "web1".into(),
            mac_addr: "00:16:3e:aa:bb:cc".into(),
            ipv4_addr: "192.168.0.10".into(),
            ipv4_gw: "192.168.0.254".into(),
            pkg_list: vec!["nginx".into()],
        }
    }

    #[test]
    fn valid_spec_converts() {
        let record = ContainerRecord::try_from(&web1()).expect("valid");
        assert_eq!(record.name, "web1");
        assert_eq!(record.mac_addr.octets(), [0x00, 0x16, 0x3e, 0xaa, 0xbb, 0xcc]);
        assert_eq!(record.ipv4_addr, Ipv4Addr::new(192, 168, 0, 10));
        assert_eq!(record.package_list, vec!["nginx"]);
    }

    #[test]
    fn mac_is_rendered_lower_case() {
        let mac: MacAddr = "00:16:3E:AA:BB:CC".parse().expect("valid");
        assert_eq!(mac.to_string(), "00:16:3e:aa:bb:cc");
    }

    #[test]
    fn malformed_macs_are_rejected() {
        for bad in [
            "",
            "00:16:3e:aa:bb",
            "00:16:3e:aa:bb:cc:dd",
            "0:16:3e:aa:bb:cc",
            "00-16-3e-aa-bb-cc",
            "gg:16:3e:aa:bb:cc",
        ] {
            let result: Result<MacAddr> = bad.parse();
            assert!(
                matches!(result, Err(LxcprovError::Validation { field: "mac_addr", .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn bad_ipv4_names_the_field() {
        let spec = RecordSpec {
            ipv4_gw: "192.168.0".into(),
            ..web1()
        };
        let err = ContainerRecord::try_from(&spec).unwrap_err();
        assert!(matches!(err, LxcprovError::Validation { field: "ipv4_gw", .. }));
    }

    #[test]
    fn bad_names_are_rejected() {
        for bad in ["", "-web", ".web", "web/1", "web 1"] {
            let spec = RecordSpec {
                name: bad.into(),
                ..web1()
            };
            assert!(ContainerRecord::try_from(&spec).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn option_like_package_is_rejected() {
        let spec = RecordSpec {
            pkg_list: vec!["nginx".into(), "--allow-unauthenticated".into()],
            ..web1()
        };
        let err = ContainerRecord::try_from(&spec).unwrap_err();
        assert!(matches!(err, LxcprovError::Validation { field: "pkg_list", .. }));
    }

    #[test]
    fn package_with_whitespace_is_rejected_with_reason() {
        let spec = RecordSpec {
            pkg_list: vec!["nginx curl".into()],
            ..web1()
        };
        let err = ContainerRecord::try_from(&spec).unwrap_err();
        let LxcprovError::Validation { field, reason, .. } = err else {
            panic!("expected a validation error");
        };
        assert_eq!(field, "pkg_list");
        assert!(reason.contains("whitespace"));
    }

    #[test]
    fn empty_package_list_is_valid() {
        let spec = RecordSpec {
            pkg_list: vec![],
            ..web1()
        };
        assert!(ContainerRecord::try_from(&spec).is_ok());
    }

    #[test]
    fn load_records_reads_wire_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[{"name":"web1","mac_addr":"00:16:3e:aa:bb:cc","ipv4_addr":"192.168.0.10",
                 "ipv4_gw":"192.168.0.254","pkg_list":["nginx"],"comment":"ignored"}]"#,
        )
        .expect("write");

        let records = load_records(&path).expect("load");
        assert_eq!(records, vec![web1()]);
    }

    #[test]
    fn load_records_rejects_missing_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[{"name":"web1","mac_addr":"00:16:3e:aa:bb:cc",
                 "ipv4_addr":"192.168.0.10","pkg_list":[]}]"#,
        )
        .expect("write");

        let result = load_records(&path);
        assert!(matches!(result, Err(LxcprovError::Serialization { .. })));
    }

    #[test]
    fn load_records_missing_file_is_io_error() {
        let result = load_records(Path::new("/nonexistent/batch.json"));
        assert!(matches!(result, Err(LxcprovError::Io { .. })));
    }
}
