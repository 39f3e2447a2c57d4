use std::net::Ipv4Addr;

use clap::{Args, Parser, Subcommand, ValueEnum};
use domain::portmap::entity::PortMapping;
use infrastructure::config::{LogFormat, LogLevel};
use infrastructure::constants::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(
    name = "hostport",
    about = "Map host TCP/UDP ports to container addresses with iptables",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "HOSTPORT_CONFIG", global = true)]
    pub config: String,

    /// Log level override (takes precedence over config file)
    #[arg(short, long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log format: json or text
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Output format
    #[arg(short, long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Print Prometheus metrics for this run after the command completes
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    Table,
    /// JSON
    Json,
}

/// Target container plus the mappings to act on.
#[derive(Args, Debug, Clone)]
pub struct MappingArgs {
    /// Container IPv4 address the host ports forward to
    #[arg(long)]
    pub container_ip: Ipv4Addr,

    /// Mappings as FROM:TO[/PROTO], e.g. 8080:80 or 5000-5010:5000-5010/udp
    #[arg(required = true, value_name = "MAPPING")]
    pub mappings: Vec<PortMapping>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Display version information
    Version,

    /// Install rules and allocate host ports
    Setup(MappingArgs),

    /// Remove rules and release host ports (best effort)
    Release(MappingArgs),

    /// Set up (or release) the static mappings from the config file
    Apply {
        /// Tear the static mappings down instead
        #[arg(long)]
        release: bool,
    },

    /// Validate mappings and print the rules they would install
    Check(MappingArgs),

    /// Manage the port mapping chain and its jump rules
    Chains {
        #[command(subcommand)]
        command: ChainsCommand,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainsCommand {
    /// Create the chain in the nat and filter tables and hook it up
    Init,
    /// Unhook, flush and delete the chain
    Remove,
}

pub fn parse() -> Cli {
    Cli::parse()
}
