use domain::common::entity::Protocol;
use domain::portmap::error::PortMapError;

/// Secondary port for the packet-filter rule engine.
///
/// Redirect rules (`rule_exists`, `insert_rule`, `delete_rule`,
/// `port_used_in_chain`) live in the NAT table; forward rules go through
/// `run_raw` against the filter table. Both use the same chain name.
///
/// Implemented by `IptablesRuleEngine` in the adapter layer.
pub trait RuleEnginePort: Send + Sync {
    /// Whether a NAT rule with exactly `args` exists in `chain`.
    fn rule_exists(&self, chain: &str, args: &[String]) -> bool;

    /// Insert a NAT rule at the head of `chain`.
    fn insert_rule(&self, chain: &str, args: &[String]) -> Result<(), PortMapError>;

    /// Delete the NAT rule matching `args` from `chain`.
    fn delete_rule(&self, chain: &str, args: &[String]) -> Result<(), PortMapError>;

    /// Whether any NAT rule in `chain` already matches a destination port in
    /// `begin..=end` for `protocol`.
    fn port_used_in_chain(&self, chain: &str, protocol: Protocol, begin: u16, end: u16) -> bool;

    /// Run the rule engine with `args` verbatim and return its output.
    ///
    /// Successful mutations produce no output; anything else is reported
    /// back to the caller to judge.
    fn run_raw(&self, args: &[String]) -> Result<String, PortMapError>;
}
