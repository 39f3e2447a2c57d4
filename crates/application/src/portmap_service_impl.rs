use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};

use domain::common::entity::Protocol;
use domain::portmap::entity::PortMapping;
use domain::portmap::error::PortMapError;
use domain::portmap::rules::{RuleArgs, generate_rule_args};
use ports::primary::portmap_service::PortMapService;
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::port_allocator_port::PortAllocatorPort;
use ports::secondary::rule_engine_port::RuleEnginePort;

/// Construction-time switches for [`PortMapAppService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapSettings {
    /// When false, setup and teardown do nothing.
    pub enabled: bool,
    /// Chain holding both the redirect and forward rules.
    pub chain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupOutcome {
    Applied,
    /// A redirect rule for one of the mappings was already present.
    AlreadyInstalled,
}

/// Application-level port mapping service.
///
/// Installs redirect/forward rules through the rule engine and records each
/// host port in the allocation table. One mapping batch runs under a single
/// service-wide lock so that the conflict check and the allocation cannot
/// interleave with another caller.
pub struct PortMapAppService {
    settings: PortMapSettings,
    rule_engine: Arc<dyn RuleEnginePort>,
    allocator: Arc<dyn PortAllocatorPort>,
    metrics: Arc<dyn MetricsPort>,
    txn: Mutex<()>,
}

impl PortMapAppService {
    pub fn new(
        settings: PortMapSettings,
        rule_engine: Arc<dyn RuleEnginePort>,
        allocator: Arc<dyn PortAllocatorPort>,
        metrics: Arc<dyn MetricsPort>,
    ) -> Self {
        Self {
            settings,
            rule_engine,
            allocator,
            metrics,
            txn: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &PortMapSettings {
        &self.settings
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    fn chain(&self) -> &str {
        &self.settings.chain
    }

    fn setup_locked(
        &self,
        container_ip: Ipv4Addr,
        mappings: &[PortMapping],
    ) -> Result<SetupOutcome, PortMapError> {
        for (idx, mapping) in mappings.iter().enumerate() {
            let args = generate_rule_args(container_ip, mapping)?;

            if self.rule_engine.rule_exists(self.chain(), &args.redirect) {
                let skipped = &mappings[idx + 1..];
                if skipped.is_empty() {
                    tracing::debug!(%container_ip, %mapping, "port mapping already installed");
                } else {
                    tracing::warn!(
                        %container_ip,
                        %mapping,
                        skipped = skipped.len(),
                        "port mapping already installed, skipping remaining mappings"
                    );
                }
                return Ok(SetupOutcome::AlreadyInstalled);
            }

            self.check_conflict(mapping.protocol, &args)?;
            self.install_rules(&args)?;
            self.allocate_ports(container_ip, mapping.protocol, &args)?;

            tracing::info!(
                %container_ip,
                protocol = %mapping.protocol,
                host_ports = %args.host_ports,
                destination = %args.destination,
                "port mapping installed"
            );
        }
        Ok(SetupOutcome::Applied)
    }

    /// Fail with `PortInUse` if any host port of `args` is taken, either in
    /// the allocation table or by an existing redirect in the chain.
    fn check_conflict(&self, protocol: Protocol, args: &RuleArgs) -> Result<(), PortMapError> {
        let hosts = args.host_ports;
        let in_table = hosts.ports().any(|p| self.allocator.is_allocated(protocol, p));
        let in_chain = !in_table
            && self
                .rule_engine
                .port_used_in_chain(self.chain(), protocol, hosts.begin, hosts.end);
        if in_table || in_chain {
            tracing::warn!(
                protocol = %protocol,
                host_ports = %hosts,
                in_chain,
                "host port conflict"
            );
            return Err(PortMapError::PortInUse {
                protocol,
                ports: hosts.to_string(),
            });
        }
        Ok(())
    }

    fn install_rules(&self, args: &RuleArgs) -> Result<(), PortMapError> {
        let chain = self.chain();

        if let Err(e) = self.rule_engine.insert_rule(chain, &args.redirect) {
            self.metrics.record_rule_error("insert_redirect");
            return Err(e);
        }

        let mut raw = Vec::with_capacity(args.forward.len() + 2);
        raw.push("-I".to_string());
        raw.push(chain.to_string());
        raw.extend(args.forward.iter().cloned());

        // The redirect rule stays in place if the forward rule fails.
        match self.rule_engine.run_raw(&raw) {
            Err(e) => {
                self.metrics.record_rule_error("insert_forward");
                Err(PortMapError::RuleEngine {
                    chain: chain.to_string(),
                    reason: format!("unable to setup forward rule: {e}"),
                })
            }
            Ok(output) if !output.trim().is_empty() => {
                self.metrics.record_rule_error("insert_forward");
                Err(PortMapError::Chain {
                    chain: chain.to_string(),
                    output,
                })
            }
            Ok(_) => Ok(()),
        }
    }

    /// Allocate every `(host, container)` pair, releasing the ones already
    /// taken by this mapping if any allocation fails.
    fn allocate_ports(
        &self,
        container_ip: Ipv4Addr,
        protocol: Protocol,
        args: &RuleArgs,
    ) -> Result<(), PortMapError> {
        let mut allocated: Vec<u16> = Vec::new();
        for (host, container) in args.port_pairs() {
            if let Err(e) = self.allocator.allocate(protocol, host, container_ip, container) {
                tracing::warn!(
                    protocol = %protocol,
                    host_port = host,
                    rolled_back = allocated.len(),
                    "host port allocation failed: {e}"
                );
                self.rollback(protocol, &allocated);
                return Err(e);
            }
            allocated.push(host);
        }
        Ok(())
    }

    fn rollback(&self, protocol: Protocol, allocated: &[u16]) {
        for &port in allocated.iter().rev() {
            if let Err(e) = self.allocator.release(protocol, port) {
                tracing::warn!(protocol = %protocol, host_port = port, "rollback release failed: {e}");
            }
        }
        self.metrics.record_rollback();
    }

    fn release_locked(&self, container_ip: Ipv4Addr, mappings: &[PortMapping]) {
        let chain = self.chain();
        for mapping in mappings {
            let protocol = mapping.protocol;
            for port in mapping.from_ports.with_end_resolved().ports() {
                if let Err(e) = self.allocator.release(protocol, port) {
                    tracing::debug!(protocol = %protocol, host_port = port, "release skipped: {e}");
                }
            }

            let args = match generate_rule_args(container_ip, mapping) {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!(%container_ip, %mapping, "skipping rule removal: {e}");
                    continue;
                }
            };

            if let Err(e) = self.rule_engine.delete_rule(chain, &args.redirect) {
                self.metrics.record_rule_error("delete_redirect");
                tracing::warn!(chain, %mapping, "failed to delete redirect rule: {e}");
            }

            let mut raw = vec!["-D".to_string(), chain.to_string()];
            raw.extend(args.forward.iter().cloned());
            if let Err(e) = self.rule_engine.run_raw(&raw) {
                self.metrics.record_rule_error("delete_forward");
                tracing::warn!(chain, %mapping, "failed to delete forward rule: {e}");
            }

            tracing::info!(
                %container_ip,
                protocol = %protocol,
                host_ports = %args.host_ports,
                "port mapping removed"
            );
        }
    }

    fn update_metrics(&self) {
        for protocol in [Protocol::Tcp, Protocol::Udp] {
            let count = self.allocator.allocated_count(protocol);
            self.metrics
                .set_ports_allocated(protocol.as_str(), count as u64);
        }
    }
}

impl PortMapService for PortMapAppService {
    fn setup_port_maps(
        &self,
        container_ip: Ipv4Addr,
        mappings: &[PortMapping],
    ) -> Result<(), PortMapError> {
        if !self.settings.enabled || mappings.is_empty() {
            return Ok(());
        }

        let result = {
            let _guard = self.txn.lock().unwrap_or_else(PoisonError::into_inner);
            self.setup_locked(container_ip, mappings)
        };

        self.metrics.record_setup(match result {
            Ok(SetupOutcome::Applied) => "ok",
            Ok(SetupOutcome::AlreadyInstalled) => "existing",
            Err(_) => "error",
        });
        self.update_metrics();
        result.map(|_| ())
    }

    fn release_port_maps(&self, container_ip: Ipv4Addr, mappings: &[PortMapping]) {
        if !self.settings.enabled || mappings.is_empty() {
            return;
        }

        {
            let _guard = self.txn.lock().unwrap_or_else(PoisonError::into_inner);
            self.release_locked(container_ip, mappings);
        }

        self.metrics.record_release();
        self.update_metrics();
    }
}
