use std::net::Ipv4Addr;

use serde::Serialize;

use super::entity::{PortMapping, PortRange};
use super::error::{PortMapError, RangeSide};

/// Redirect target jump.
pub const TARGET_DNAT: &str = "DNAT";
/// Forwarding-permit jump.
pub const TARGET_ACCEPT: &str = "ACCEPT";

/// Argument lists for the two rules that realise one mapping, plus the
/// normalized ranges they were built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleArgs {
    /// Destination NAT rule, matched on host ports.
    pub redirect: Vec<String>,
    /// Accept rule, matched on the container address and ports.
    pub forward: Vec<String>,
    /// Host ports with the unset sentinel resolved.
    pub host_ports: PortRange,
    /// Container ports with the unset sentinel resolved.
    pub container_ports: PortRange,
    /// `ip:P` or `ip:P1-P2`.
    pub destination: String,
}

impl RuleArgs {
    /// Pairs of `(host_port, container_port)` to allocate, in order.
    ///
    /// Equal spans zip positionally; a single host port binds to the first
    /// container port.
    pub fn port_pairs(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.host_ports.ports().zip(self.container_ports.ports())
    }
}

/// Validate `mapping` and build its redirect and forward rule arguments.
///
/// Legal cardinalities are 1:N (one host port fanned into a container range)
/// and N:N (equal spans). M:N is rejected.
pub fn generate_rule_args(
    container_ip: Ipv4Addr,
    mapping: &PortMapping,
) -> Result<RuleArgs, PortMapError> {
    let proto = mapping.protocol.as_str();

    let host_ports = mapping.from_ports.normalize(RangeSide::From)?;
    let container_ports = mapping.to_ports.normalize(RangeSide::To)?;

    let destination = format!("{container_ip}:{container_ports}");

    let host_span = host_ports.span();
    let container_span = container_ports.span();
    if host_span != 0 && host_span != container_span {
        return Err(PortMapError::RangeMismatch {
            from: host_ports.to_match_arg(),
            to: destination,
        });
    }

    let host_match = host_ports.to_match_arg();
    let container_match = container_ports.to_match_arg();
    let ip = container_ip.to_string();

    let redirect = to_args(&[
        "-p",
        proto,
        "-m",
        proto,
        "--dport",
        &host_match,
        "-j",
        TARGET_DNAT,
        "--to-destination",
        &destination,
    ]);

    let forward = to_args(&[
        "-d",
        &ip,
        "-p",
        proto,
        "-m",
        proto,
        "--dport",
        &container_match,
        "-j",
        TARGET_ACCEPT,
    ]);

    Ok(RuleArgs {
        redirect,
        forward,
        host_ports,
        container_ports,
        destination,
    })
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}
