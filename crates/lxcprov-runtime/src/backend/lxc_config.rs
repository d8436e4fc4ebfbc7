//! Editing of LXC container configuration files.
//!
//! The file is kept line by line so comments, ordering, and keys this
//! crate does not touch survive a load/save cycle unchanged.

use std::path::Path;

use lxcprov_common::error::{LxcprovError, Result};

/// Key prefixes that describe network interfaces, current and legacy.
const NETWORK_KEYS: &[&str] = &["lxc.net", "lxc.network"];

/// In-memory copy of a container's `config` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LxcConfig {
    lines: Vec<String>,
}

impl LxcConfig {
    /// Parses configuration text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Loads a configuration file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| LxcprovError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::parse(&text))
    }

    /// Writes the configuration back, replacing the whole file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render()).map_err(|e| LxcprovError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Renders the configuration as file content.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Returns the value of the last assignment to `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .filter_map(|l| split_entry(l))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Appends `key = value`.
    pub fn push(&mut self, key: &str, value: impl std::fmt::Display) {
        self.lines.push(format!("{key} = {value}"));
    }

    /// Removes every network interface key, returning how many lines went.
    pub fn clear_network(&mut self) -> usize {
        let before = self.lines.len();
        self.lines
            .retain(|l| split_entry(l).is_none_or(|(key, _)| !is_network_key(key)));
        before - self.lines.len()
    }
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn is_network_key(key: &str) -> bool {
    NETWORK_KEYS.iter().any(|prefix| {
        key.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Template used to create this container: /usr/share/lxc/templates/lxc-debian
lxc.rootfs.path = dir:/var/lib/lxc/web1/rootfs
lxc.net.0.type = veth
lxc.net.0.link = lxcbr0
lxc.network.type = empty
lxc.uts.name = web1
lxc.netns.share = none
";

    #[test]
    fn clear_network_keeps_other_keys() {
        let mut config = LxcConfig::parse(SAMPLE);
        assert_eq!(config.clear_network(), 3);
        let text = config.render();
        assert!(!text.contains("lxc.net."));
        assert!(!text.contains("lxc.network"));
        assert!(text.contains("# Template used"));
        assert!(text.contains("lxc.uts.name = web1"));
        assert!(text.contains("lxc.netns.share = none"));
    }

    #[test]
    fn get_returns_last_assignment() {
        let mut config = LxcConfig::parse(SAMPLE);
        config.push("lxc.uts.name", "web2");
        assert_eq!(config.get("lxc.uts.name"), Some("web2"));
        assert_eq!(
            config.get("lxc.rootfs.path"),
            Some("dir:/var/lib/lxc/web1/rootfs")
        );
        assert_eq!(config.get("lxc.missing"), None);
    }

    #[test]
    fn bare_lxc_net_key_counts_as_network() {
        assert!(is_network_key("lxc.net"));
        assert!(is_network_key("lxc.net.0.hwaddr"));
        assert!(!is_network_key("lxc.netns.share"));
    }

    #[test]
    fn save_and_load_preserve_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config");
        let mut config = LxcConfig::parse(SAMPLE);
        config.push("lxc.net.1.type", "veth");
        config.save(&path).expect("save");

        let loaded = LxcConfig::load(&path).expect("load");
        assert_eq!(loaded, config);
        assert!(std::fs::read_to_string(&path).expect("read").ends_with("veth\n"));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(LxcConfig::load(&dir.path().join("config")).is_err());
    }
}
