use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};

use domain::common::entity::Protocol;
use domain::portmap::allocation::{PortAllocationTable, PortBinding};
use domain::portmap::entity::PortRange;
use domain::portmap::error::PortMapError;

use crate::secondary::metrics_port::{AllocationMetrics, RuleMetrics};
use crate::secondary::port_allocator_port::PortAllocatorPort;
use crate::secondary::rule_engine_port::RuleEnginePort;

/// No-op implementation of all metrics sub-traits for use in tests.
///
/// All methods inherit the default no-op implementations from the sub-traits.
pub struct NoopMetrics;

impl AllocationMetrics for NoopMetrics {}
impl RuleMetrics for NoopMetrics {}

// ── Rule engine ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredRule {
    chain: String,
    args: Vec<String>,
}

/// In-memory rule engine keeping NAT and filter rules per chain.
///
/// `run_raw` understands `-I`/`-A`/`-D CHAIN args...` against the filter
/// table. Failures can be injected for the forward rule path.
#[derive(Default)]
pub struct InMemoryRuleEngine {
    nat: Mutex<Vec<StoredRule>>,
    filter: Mutex<Vec<StoredRule>>,
    fail_raw: Mutex<bool>,
    raw_output: Mutex<Option<String>>,
    fail_nat_insert: Mutex<bool>,
}

impl InMemoryRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `run_raw` call fail.
    pub fn fail_raw(&self, fail: bool) {
        *self.fail_raw.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Make subsequent `run_raw` calls succeed but print `output`.
    pub fn raw_output(&self, output: Option<&str>) {
        *self.raw_output.lock().unwrap_or_else(PoisonError::into_inner) =
            output.map(str::to_string);
    }

    /// Make subsequent `insert_rule` calls fail.
    pub fn fail_nat_insert(&self, fail: bool) {
        *self
            .fail_nat_insert
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// NAT rules in `chain`, most recently inserted first.
    pub fn nat_rules(&self, chain: &str) -> Vec<Vec<String>> {
        Self::rules_in(&self.nat, chain)
    }

    /// Filter rules in `chain`, most recently inserted first.
    pub fn filter_rules(&self, chain: &str) -> Vec<Vec<String>> {
        Self::rules_in(&self.filter, chain)
    }

    pub fn is_empty(&self) -> bool {
        self.nat.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
            && self
                .filter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
    }

    fn rules_in(rules: &Mutex<Vec<StoredRule>>, chain: &str) -> Vec<Vec<String>> {
        rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.chain == chain)
            .map(|r| r.args.clone())
            .collect()
    }

    fn delete_from(
        rules: &Mutex<Vec<StoredRule>>,
        chain: &str,
        args: &[String],
    ) -> Result<(), PortMapError> {
        let mut rules = rules.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = rules
            .iter()
            .position(|r| r.chain == chain && r.args == args)
            .ok_or_else(|| PortMapError::RuleEngine {
                chain: chain.to_string(),
                reason: "Bad rule (does a matching rule exist in that chain?)".to_string(),
            })?;
        rules.remove(pos);
        Ok(())
    }
}

fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

impl RuleEnginePort for InMemoryRuleEngine {
    fn rule_exists(&self, chain: &str, args: &[String]) -> bool {
        self.nat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| r.chain == chain && r.args == args)
    }

    fn insert_rule(&self, chain: &str, args: &[String]) -> Result<(), PortMapError> {
        if *self
            .fail_nat_insert
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(PortMapError::RuleEngine {
                chain: chain.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.nat.lock().unwrap_or_else(PoisonError::into_inner).insert(
            0,
            StoredRule {
                chain: chain.to_string(),
                args: args.to_vec(),
            },
        );
        Ok(())
    }

    fn delete_rule(&self, chain: &str, args: &[String]) -> Result<(), PortMapError> {
        Self::delete_from(&self.nat, chain, args)
    }

    fn port_used_in_chain(&self, chain: &str, protocol: Protocol, begin: u16, end: u16) -> bool {
        let wanted = PortRange::new(begin, end);
        self.nat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.chain == chain)
            .filter(|r| arg_after(&r.args, "-p") == Some(protocol.as_str()))
            .filter_map(|r| arg_after(&r.args, "--dport").and_then(PortRange::from_match_arg))
            .any(|used| used.overlaps(&wanted))
    }

    fn run_raw(&self, args: &[String]) -> Result<String, PortMapError> {
        let (op, chain) = match args {
            [op, chain, ..] => (op.as_str(), chain.as_str()),
            _ => return Ok(String::new()),
        };
        if *self.fail_raw.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(PortMapError::RuleEngine {
                chain: chain.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let rule = &args[2..];
        match op {
            "-I" => self.filter.lock().unwrap_or_else(PoisonError::into_inner).insert(
                0,
                StoredRule {
                    chain: chain.to_string(),
                    args: rule.to_vec(),
                },
            ),
            "-A" => self
                .filter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(StoredRule {
                    chain: chain.to_string(),
                    args: rule.to_vec(),
                }),
            "-D" => Self::delete_from(&self.filter, chain, rule)?,
            _ => {}
        }
        Ok(self
            .raw_output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default())
    }
}

// ── Allocation table ────────────────────────────────────────────────

/// Mutex-guarded allocation table that can be told to reject one host port.
#[derive(Default)]
pub struct MockAllocator {
    table: Mutex<PortAllocationTable>,
    fail_on: Mutex<Option<(Protocol, u16)>>,
    allocate_calls: Mutex<usize>,
}

impl MockAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `allocate` fail for `(protocol, port)` even when it is free.
    pub fn fail_on(&self, protocol: Protocol, port: u16) {
        *self.fail_on.lock().unwrap_or_else(PoisonError::into_inner) = Some((protocol, port));
    }

    pub fn allocate_calls(&self) -> usize {
        *self
            .allocate_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PortAllocatorPort for MockAllocator {
    fn allocate(
        &self,
        protocol: Protocol,
        host_port: u16,
        container_ip: Ipv4Addr,
        container_port: u16,
    ) -> Result<(), PortMapError> {
        *self
            .allocate_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
        if *self.fail_on.lock().unwrap_or_else(PoisonError::into_inner) == Some((protocol, host_port))
        {
            return Err(PortMapError::AlreadyAllocated {
                protocol,
                port: host_port,
            });
        }
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .allocate(protocol, host_port, container_ip, container_port)
    }

    fn release(&self, protocol: Protocol, host_port: u16) -> Result<(), PortMapError> {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release(protocol, host_port)
            .map(|_| ())
    }

    fn lookup(&self, protocol: Protocol, host_port: u16) -> Option<PortBinding> {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(protocol, host_port)
    }

    fn allocated_count(&self, protocol: Protocol) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count(protocol)
    }
}
