//! Port mapping configuration section.

use std::net::Ipv4Addr;

use application::portmap_service_impl::PortMapSettings;
use domain::portmap::entity::PortMapping;
use domain::portmap::rules::generate_rule_args;
use serde::{Deserialize, Serialize};

use super::common::{ConfigError, check_limit, default_true};
use crate::constants::{DEFAULT_CHAIN, DEFAULT_IPTABLES_PATH, MAX_CHAIN_NAME_LEN, MAX_STATIC_MAPPINGS};

/// `portmap:` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapConfig {
    /// Administrative switch. When false, setup and release do nothing.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_chain")]
    pub chain: String,

    #[serde(default = "default_iptables_path")]
    pub iptables_path: String,

    /// Pass `--wait` so concurrent iptables callers queue on the xtables lock.
    #[serde(default = "default_true")]
    pub use_wait: bool,

    /// Mappings installed by `hostport apply`.
    #[serde(default)]
    pub mappings: Vec<StaticMappingConfig>,
}

impl Default for PortMapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chain: default_chain(),
            iptables_path: default_iptables_path(),
            use_wait: true,
            mappings: Vec::new(),
        }
    }
}

/// One container and the port specs (`FROM:TO[/PROTO]`) to map to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticMappingConfig {
    pub container_ip: Ipv4Addr,
    pub ports: Vec<String>,
}

impl PortMapConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        validate_chain_name("portmap.chain", &self.chain)?;

        if self.iptables_path.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "portmap.iptables_path".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        check_limit("portmap.mappings", self.mappings.len(), MAX_STATIC_MAPPINGS)?;
        for (idx, entry) in self.mappings.iter().enumerate() {
            entry.to_mappings(idx)?;
        }
        Ok(())
    }

    /// Settings handed to the port mapping service.
    pub fn settings(&self) -> PortMapSettings {
        PortMapSettings {
            enabled: self.enabled,
            chain: self.chain.clone(),
        }
    }

    /// Parsed static mappings, grouped per container.
    pub fn static_mappings(&self) -> Result<Vec<(Ipv4Addr, Vec<PortMapping>)>, ConfigError> {
        self.mappings
            .iter()
            .enumerate()
            .map(|(idx, entry)| Ok((entry.container_ip, entry.to_mappings(idx)?)))
            .collect()
    }
}

impl StaticMappingConfig {
    /// Parse every port spec and check that rules can be generated for it.
    fn to_mappings(&self, idx: usize) -> Result<Vec<PortMapping>, ConfigError> {
        if self.ports.is_empty() {
            return Err(ConfigError::Validation {
                field: format!("portmap.mappings[{idx}].ports"),
                message: "at least one port mapping is required".to_string(),
            });
        }
        self.ports
            .iter()
            .enumerate()
            .map(|(j, spec)| {
                let field = || format!("portmap.mappings[{idx}].ports[{j}]");
                let mapping = spec
                    .parse::<PortMapping>()
                    .map_err(|e| ConfigError::Validation {
                        field: field(),
                        message: e.to_string(),
                    })?;
                generate_rule_args(self.container_ip, &mapping).map_err(|e| {
                    ConfigError::Validation {
                        field: field(),
                        message: e.to_string(),
                    }
                })?;
                Ok(mapping)
            })
            .collect()
    }
}

/// Chain names must be non-empty, at most 28 characters, without whitespace.
pub fn validate_chain_name(field: &str, chain: &str) -> Result<(), ConfigError> {
    let message = if chain.is_empty() {
        "must not be empty".to_string()
    } else if chain.len() > MAX_CHAIN_NAME_LEN {
        format!("'{chain}' is longer than {MAX_CHAIN_NAME_LEN} characters")
    } else if chain.contains(char::is_whitespace) {
        format!("'{chain}' contains whitespace")
    } else {
        return Ok(());
    };
    Err(ConfigError::Validation {
        field: field.to_string(),
        message,
    })
}

fn default_chain() -> String {
    DEFAULT_CHAIN.to_string()
}

fn default_iptables_path() -> String {
    DEFAULT_IPTABLES_PATH.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::common::entity::Protocol;

    fn static_entry(ports: &[&str]) -> StaticMappingConfig {
        StaticMappingConfig {
            container_ip: Ipv4Addr::new(10, 0, 0, 2),
            ports: ports.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    #[test]
    fn defaults() {
        let cfg = PortMapConfig::default();
        assert!(cfg.enabled);
        assert!(cfg.use_wait);
        assert_eq!(cfg.chain, "HOSTPORT");
        assert_eq!(cfg.iptables_path, "iptables");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn chain_name_rules() {
        assert!(validate_chain_name("c", "HOSTPORT").is_ok());
        assert!(validate_chain_name("c", "").is_err());
        assert!(validate_chain_name("c", "HOST PORT").is_err());
        assert!(validate_chain_name("c", &"X".repeat(28)).is_ok());
        let err = validate_chain_name("c", &"X".repeat(29)).unwrap_err();
        assert!(err.to_string().contains("longer than 28"));
    }

    #[test]
    fn static_mappings_parse() {
        let cfg = PortMapConfig {
            mappings: vec![static_entry(&["8080:80", "5000-5010:6000-6010/udp"])],
            ..PortMapConfig::default()
        };
        cfg.validate().unwrap();
        let parsed = cfg.static_mappings().unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].1.len(), 2);
        assert_eq!(parsed[0].1[1].protocol, Protocol::Udp);
    }

    #[test]
    fn static_mapping_range_mismatch_names_field() {
        let cfg = PortMapConfig {
            mappings: vec![static_entry(&["8080:80", "8000-8005:80-84"])],
            ..PortMapConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("portmap.mappings[0].ports[1]"), "{msg}");
        assert!(msg.contains("range mismatch"), "{msg}");
    }

    #[test]
    fn static_mapping_without_ports_rejected() {
        let cfg = PortMapConfig {
            mappings: vec![static_entry(&[])],
            ..PortMapConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn settings_follow_config() {
        let cfg = PortMapConfig {
            enabled: false,
            chain: "PORTS".to_string(),
            ..PortMapConfig::default()
        };
        let settings = cfg.settings();
        assert!(!settings.enabled);
        assert_eq!(settings.chain, "PORTS");
    }
}
