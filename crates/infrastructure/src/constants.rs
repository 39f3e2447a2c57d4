// ── Paths ──────────────────────────────────────────────────────────

pub const DEFAULT_CONFIG_PATH: &str = "/etc/hostport/config.yaml";
pub const DEFAULT_IPTABLES_PATH: &str = "iptables";

// ── Chains ─────────────────────────────────────────────────────────

pub const DEFAULT_CHAIN: &str = "HOSTPORT";

/// iptables rejects chain names of 29 characters or more.
pub const MAX_CHAIN_NAME_LEN: usize = 28;

// ── Limits ─────────────────────────────────────────────────────────

/// Maximum static mappings accepted from the config file.
pub const MAX_STATIC_MAPPINGS: usize = 1_024;
