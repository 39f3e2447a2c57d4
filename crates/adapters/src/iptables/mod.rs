//! iptables-backed rule engine and chain bootstrap.
//!
//! Redirect rules live in the `nat` table, forward rules in `filter`, both
//! under the same chain name.

pub mod chains;
pub mod rule_engine;
pub mod runner;

pub use chains::IptablesChains;
pub use rule_engine::IptablesRuleEngine;
pub use runner::{CommandOutput, CommandRunner, Iptables, SystemCommandRunner};
