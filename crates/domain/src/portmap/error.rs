use thiserror::Error;

use crate::common::entity::Protocol;

/// Which side of a mapping a port range belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSide {
    /// Host-side ports.
    From,
    /// Container-side ports.
    To,
}

impl std::fmt::Display for RangeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::From => "from",
            Self::To => "to",
        })
    }
}

/// Coarse classification of a [`PortMapError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMapErrorKind {
    /// Malformed port or protocol text.
    Parse,
    /// Illegal range order or cardinality.
    Validation,
    /// Host port already taken.
    Conflict,
    /// Rule install/remove/query failed.
    RuleEngine,
    /// Allocation table rejected the operation.
    Allocation,
}

#[derive(Debug, Error)]
pub enum PortMapError {
    #[error("invalid port '{value}': {reason}")]
    InvalidPort { value: String, reason: String },

    #[error("unsupported protocol {protocol}")]
    UnsupportedProtocol { protocol: String },

    #[error("invalid port mapping '{value}': {reason}")]
    InvalidMapping { value: String, reason: String },

    #[error("invalid {side} port range {begin}-{end}")]
    InvalidPortRange { side: RangeSide, begin: u16, end: u16 },

    #[error("range mismatch, cannot map ports {from} to {to}")]
    RangeMismatch { from: String, to: String },

    #[error("host port {ports}/{protocol} is already in use")]
    PortInUse { protocol: Protocol, ports: String },

    #[error("rule engine error in {chain} chain: {reason}")]
    RuleEngine { chain: String, reason: String },

    #[error("unexpected output from rule engine in {chain} chain: {output}")]
    Chain { chain: String, output: String },

    #[error("host port {port}/{protocol} is already allocated")]
    AlreadyAllocated { protocol: Protocol, port: u16 },

    #[error("host port {port}/{protocol} is not allocated")]
    NotAllocated { protocol: Protocol, port: u16 },
}

impl PortMapError {
    pub fn kind(&self) -> PortMapErrorKind {
        match self {
            Self::InvalidPort { .. }
            | Self::UnsupportedProtocol { .. }
            | Self::InvalidMapping { .. } => PortMapErrorKind::Parse,
            Self::InvalidPortRange { .. } | Self::RangeMismatch { .. } => {
                PortMapErrorKind::Validation
            }
            Self::PortInUse { .. } => PortMapErrorKind::Conflict,
            Self::RuleEngine { .. } | Self::Chain { .. } => PortMapErrorKind::RuleEngine,
            Self::AlreadyAllocated { .. } | Self::NotAllocated { .. } => {
                PortMapErrorKind::Allocation
            }
        }
    }
}
