//! Agent configuration: structs, parsing, and validation.
//!
//! - `common`: `ConfigError` and shared helpers
//! - `portmap`: the `portmap:` section

mod common;
mod portmap;

pub use common::ConfigError;
pub use portmap::{PortMapConfig, StaticMappingConfig, validate_chain_name};

use std::net::Ipv4Addr;
use std::path::Path;

use application::portmap_service_impl::PortMapSettings;
use domain::portmap::entity::PortMapping;
use serde::{Deserialize, Serialize};

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentInfo,

    #[serde(default)]
    pub portmap: PortMapConfig,
}

impl AgentConfig {
    /// Load and validate config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parse and validate config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.portmap.validate()
    }

    /// Service settings derived from the `portmap` section.
    pub fn settings(&self) -> PortMapSettings {
        self.portmap.settings()
    }

    /// Static mappings from `portmap.mappings`, parsed.
    pub fn static_mappings(&self) -> Result<Vec<(Ipv4Addr, Vec<PortMapping>)>, ConfigError> {
        self.portmap.static_mappings()
    }
}

// ── Agent info ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}
fn default_log_format() -> LogFormat {
    LogFormat::Text
}

// ── Log level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "invalid log level '{s}': expected error|warn|info|debug|trace"
            )),
        }
    }
}

// ── Log format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(format!("invalid log format '{s}': expected json|text")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use domain::common::entity::Protocol;

    const FULL: &str = r#"
agent:
  log_level: debug
  log_format: json
portmap:
  enabled: true
  chain: PORTS
  iptables_path: /usr/sbin/iptables
  use_wait: false
  mappings:
    - container_ip: 10.0.0.2
      ports: ["8080:80", "5000-5010:5000-5010/udp"]
    - container_ip: 10.0.0.3
      ports: ["2222:22"]
"#;

    // ── Loading ───────────────────────────────────────────────────

    #[test]
    fn empty_document_uses_defaults() {
        let config = AgentConfig::from_yaml("{}").unwrap();
        assert_eq!(config.agent.log_level, LogLevel::Info);
        assert_eq!(config.agent.log_format, LogFormat::Text);
        assert!(config.portmap.enabled);
        assert_eq!(config.portmap.chain, "HOSTPORT");
        assert!(config.static_mappings().unwrap().is_empty());
    }

    #[test]
    fn full_document() {
        let config = AgentConfig::from_yaml(FULL).unwrap();
        assert_eq!(config.agent.log_level, LogLevel::Debug);
        assert_eq!(config.agent.log_format, LogFormat::Json);
        assert_eq!(config.portmap.iptables_path, "/usr/sbin/iptables");
        assert!(!config.portmap.use_wait);

        let settings = config.settings();
        assert_eq!(settings.chain, "PORTS");

        let mappings = config.static_mappings().unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].0, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(mappings[0].1[1].protocol, Protocol::Udp);
        assert_eq!(mappings[1].1[0].to_ports.begin, 22);
    }

    #[test]
    fn unknown_top_level_field_rejected() {
        let err = AgentConfig::from_yaml("firewall: {}\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn invalid_container_ip_rejected() {
        let yaml = r#"
portmap:
  mappings:
    - container_ip: 10.0.0.300
      ports: ["80:80"]
"#;
        assert!(matches!(
            AgentConfig::from_yaml(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn invalid_port_spec_rejected() {
        let yaml = r#"
portmap:
  mappings:
    - container_ip: 10.0.0.2
      ports: ["80:80/icmp"]
"#;
        let err = AgentConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("unsupported protocol icmp"));
    }

    #[test]
    fn chain_with_space_rejected() {
        let yaml = "portmap:\n  chain: \"HOST PORT\"\n";
        assert!(matches!(
            AgentConfig::from_yaml(yaml),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.portmap.chain, "PORTS");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AgentConfig::load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    // ── LogLevel ──────────────────────────────────────────────────

    #[test]
    fn log_level_parse() {
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Trace.to_string(), "trace");
    }

    // ── LogFormat ─────────────────────────────────────────────────

    #[test]
    fn log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.as_str(), "json");
    }
}
