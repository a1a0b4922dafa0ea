//! Agent configuration.
//!
//! Loaded from a JSON file, overridden from the command line, then resolved
//! into [`Settings`]. Every field has a default so a partial file is valid.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use upf_fwdplane::SwitchTarget;

use crate::error::{PfcpifaceError, Result};

pub const DEFAULT_MAX_SESSIONS: usize = 50_000;

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conf {
    pub max_sessions: usize,
    pub p4rtc_iface: P4rtcIface,
    pub cp_iface: CpIface,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            p4rtc_iface: P4rtcIface::default(),
            cp_iface: CpIface::default(),
        }
    }
}

/// Forwarding-plane control interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct P4rtcIface {
    /// Access-side prefix, `address/len`.
    pub access_ip: String,
    pub p4rtc_server: String,
    pub p4rtc_port: String,
    pub device_id: u64,
    pub timeout_secs: u64,
}

impl Default for P4rtcIface {
    fn default() -> Self {
        Self {
            access_ip: "198.18.0.1/32".to_string(),
            p4rtc_server: "onos".to_string(),
            p4rtc_port: "51001".to_string(),
            device_id: 1,
            timeout_secs: 30,
        }
    }
}

/// Control-plane (N4) interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpIface {
    /// Local N4 address; `0.0.0.0` or empty to learn it from the first peer.
    pub n4_addr: String,
    /// SMF / SPGW-C address to associate with; empty for responder-only.
    pub peer_addr: String,
}

impl Default for CpIface {
    fn default() -> Self {
        Self {
            n4_addr: "0.0.0.0".to_string(),
            peer_addr: String::new(),
        }
    }
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub p4rtc_server: Option<String>,
    pub p4rtc_port: Option<String>,
    pub n4_addr: Option<String>,
    pub peer_addr: Option<String>,
}

/// Access-side prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPrefix {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl std::str::FromStr for AccessPrefix {
    type Err = PfcpifaceError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PfcpifaceError::invalid_config("access_ip", format!("'{}'", s));
        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (addr, len.parse::<u8>().map_err(|_| invalid())?),
            None => (s, 32),
        };
        if len > 32 {
            return Err(invalid());
        }
        Ok(Self {
            address: addr.trim().parse().map_err(|_| invalid())?,
            prefix_len: len,
        })
    }
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub max_sessions: usize,
    pub access: AccessPrefix,
    pub switch: SwitchTarget,
    /// `None` until learned from the first datagram.
    pub n4_addr: Option<Ipv4Addr>,
    /// `None` in responder-only mode.
    pub peer_addr: Option<Ipv4Addr>,
}

impl Conf {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| PfcpifaceError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let conf = serde_json::from_str(&raw).map_err(|source| PfcpifaceError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(conf)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(server) = &overrides.p4rtc_server {
            self.p4rtc_iface.p4rtc_server = server.clone();
        }
        if let Some(port) = &overrides.p4rtc_port {
            self.p4rtc_iface.p4rtc_port = port.clone();
        }
        if let Some(addr) = &overrides.n4_addr {
            self.cp_iface.n4_addr = addr.clone();
        }
        if let Some(addr) = &overrides.peer_addr {
            self.cp_iface.peer_addr = addr.clone();
        }
    }

    pub fn resolve(&self) -> Result<Settings> {
        if self.max_sessions == 0 {
            return Err(PfcpifaceError::invalid_config(
                "max_sessions",
                "must be greater than zero",
            ));
        }

        let access = self.p4rtc_iface.access_ip.parse()?;

        let server = self.p4rtc_iface.p4rtc_server.trim();
        if server.is_empty() {
            return Err(PfcpifaceError::invalid_config("p4rtc_server", "empty"));
        }
        let port: u16 = self.p4rtc_iface.p4rtc_port.trim().parse().map_err(|_| {
            PfcpifaceError::invalid_config(
                "p4rtc_port",
                format!("'{}'", self.p4rtc_iface.p4rtc_port),
            )
        })?;

        Ok(Settings {
            max_sessions: self.max_sessions,
            access,
            switch: SwitchTarget {
                address: format!("{}:{}", server, port),
                device_id: self.p4rtc_iface.device_id,
                timeout: Duration::from_secs(self.p4rtc_iface.timeout_secs),
            },
            n4_addr: parse_optional_addr("n4_addr", &self.cp_iface.n4_addr)?,
            peer_addr: parse_optional_addr("peer_addr", &self.cp_iface.peer_addr)?,
        })
    }
}

/// Empty and `0.0.0.0` both mean unset.
fn parse_optional_addr(field: &str, value: &str) -> Result<Option<Ipv4Addr>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let addr: Ipv4Addr = value
        .parse()
        .map_err(|_| PfcpifaceError::invalid_config(field, format!("'{}'", value)))?;
    Ok((!addr.is_unspecified()).then_some(addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_object_uses_defaults() {
        let conf: Conf = serde_json::from_str("{}").unwrap();
        assert_eq!(conf, Conf::default());

        let settings = conf.resolve().unwrap();
        assert_eq!(settings.max_sessions, DEFAULT_MAX_SESSIONS);
        assert_eq!(settings.access.address, Ipv4Addr::new(198, 18, 0, 1));
        assert_eq!(settings.access.prefix_len, 32);
        assert_eq!(settings.switch.address, "onos:51001");
        assert_eq!(settings.switch.timeout, Duration::from_secs(30));
        assert_eq!(settings.n4_addr, None);
        assert_eq!(settings.peer_addr, None);
    }

    #[test]
    fn test_partial_file() {
        let conf: Conf = serde_json::from_str(
            r#"{"p4rtc_iface": {"access_ip": "10.128.13.29/24"}, "cp_iface": {"peer_addr": "10.0.0.2"}}"#,
        )
        .unwrap();
        let settings = conf.resolve().unwrap();
        assert_eq!(settings.access.prefix_len, 24);
        assert_eq!(settings.switch.address, "onos:51001");
        assert_eq!(settings.peer_addr, Some(Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn test_bad_prefix_rejected() {
        for bad in ["198.18.0.1/33", "not-an-ip/24", "198.18.0/24", "198.18.0.1/x"] {
            let mut conf = Conf::default();
            conf.p4rtc_iface.access_ip = bad.to_string();
            assert!(
                matches!(conf.resolve(), Err(PfcpifaceError::InvalidConfig { .. })),
                "{} accepted",
                bad
            );
        }
    }

    #[test]
    fn test_empty_server_rejected() {
        let mut conf = Conf::default();
        conf.p4rtc_iface.p4rtc_server = " ".to_string();
        assert!(conf.resolve().is_err());
    }

    #[test]
    fn test_overrides_win() {
        let mut conf = Conf::default();
        conf.apply_overrides(&ConfigOverrides {
            p4rtc_server: Some("10.1.1.1".to_string()),
            p4rtc_port: Some("50001".to_string()),
            n4_addr: Some("10.0.0.1".to_string()),
            peer_addr: None,
        });
        let settings = conf.resolve().unwrap();
        assert_eq!(settings.switch.address, "10.1.1.1:50001");
        assert_eq!(settings.n4_addr, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(settings.peer_addr, None);
    }

    #[test]
    fn test_unspecified_peer_is_responder_only() {
        let mut conf = Conf::default();
        conf.cp_iface.peer_addr = "0.0.0.0".to_string();
        assert_eq!(conf.resolve().unwrap().peer_addr, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_sessions": 10}}"#).unwrap();
        let conf = Conf::load(file.path()).unwrap();
        assert_eq!(conf.max_sessions, 10);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            Conf::load(file.path()),
            Err(PfcpifaceError::ConfigParse { .. })
        ));
    }
}
