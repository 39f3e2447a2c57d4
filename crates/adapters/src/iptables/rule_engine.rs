use domain::common::entity::Protocol;
use domain::portmap::entity::PortRange;
use domain::portmap::error::PortMapError;
use ports::secondary::rule_engine_port::RuleEnginePort;

use super::runner::{Iptables, table_args};

const NAT: &str = "nat";

/// [`RuleEnginePort`] that shells out to `iptables`.
///
/// `insert_rule`/`delete_rule`/`rule_exists` act on the `nat` table;
/// `run_raw` passes its arguments through untouched (filter table).
pub struct IptablesRuleEngine {
    iptables: Iptables,
}

impl IptablesRuleEngine {
    pub fn new(iptables: Iptables) -> Self {
        Self { iptables }
    }
}

impl RuleEnginePort for IptablesRuleEngine {
    fn rule_exists(&self, chain: &str, args: &[String]) -> bool {
        match self.iptables.exec(chain, &table_args(NAT, "-C", chain, args)) {
            Ok(out) => out.success,
            Err(e) => {
                tracing::warn!(chain, "rule check failed: {e}");
                false
            }
        }
    }

    fn insert_rule(&self, chain: &str, args: &[String]) -> Result<(), PortMapError> {
        self.iptables
            .exec_checked(chain, &table_args(NAT, "-I", chain, args))?;
        tracing::debug!(chain, ?args, "nat rule inserted");
        Ok(())
    }

    fn delete_rule(&self, chain: &str, args: &[String]) -> Result<(), PortMapError> {
        self.iptables
            .exec_checked(chain, &table_args(NAT, "-D", chain, args))?;
        tracing::debug!(chain, ?args, "nat rule deleted");
        Ok(())
    }

    fn port_used_in_chain(&self, chain: &str, protocol: Protocol, begin: u16, end: u16) -> bool {
        let listing = match self
            .iptables
            .exec_checked(chain, &table_args(NAT, "-S", chain, &[]))
        {
            Ok(out) => out.stdout,
            Err(e) => {
                tracing::warn!(chain, "unable to list chain: {e}");
                return false;
            }
        };
        let wanted = PortRange::new(begin, end);
        listing
            .lines()
            .filter_map(|line| redirected_ports(line, chain, protocol))
            .any(|used| used.overlaps(&wanted))
    }

    fn run_raw(&self, args: &[String]) -> Result<String, PortMapError> {
        let chain = args.get(1).map_or("", String::as_str);
        let out = self.iptables.exec_checked(chain, args)?;
        Ok(out.stdout)
    }
}

/// Host ports matched by one `-S` listing line, if it is an `-A CHAIN` rule
/// for `protocol` with a `--dport`.
fn redirected_ports(line: &str, chain: &str, protocol: Protocol) -> Option<PortRange> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first() != Some(&"-A") || tokens.get(1) != Some(&chain) {
        return None;
    }
    let value_of = |flag: &str| {
        tokens
            .iter()
            .position(|t| *t == flag)
            .and_then(|i| tokens.get(i + 1))
            .copied()
    };
    if value_of("-p") != Some(protocol.as_str()) {
        return None;
    }
    value_of("--dport").and_then(PortRange::from_match_arg)
}
