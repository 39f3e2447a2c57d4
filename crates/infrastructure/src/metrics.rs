use ports::secondary::metrics_port::{AllocationMetrics, RuleMetrics};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

// ── Label types ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProtocolLabels {
    pub protocol: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResultLabels {
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OpLabels {
    pub op: String,
}

// ── Agent metrics registry ──────────────────────────────────────────

/// Prometheus registry for port mapping activity.
///
/// Metric families are atomic, so recording only needs `&self`. Share it
/// behind an `Arc`.
pub struct AgentMetrics {
    registry: Registry,
    pub ports_allocated: Family<ProtocolLabels, Gauge>,
    pub setup_total: Family<ResultLabels, Counter>,
    pub release_total: Counter,
    pub rollbacks_total: Counter,
    pub rule_errors_total: Family<OpLabels, Counter>,
}

impl AgentMetrics {
    /// Registry with every metric under the `hostport` prefix.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("hostport");

        let ports_allocated = Family::<ProtocolLabels, Gauge>::default();
        registry.register(
            "ports_allocated",
            "Host ports currently held in the allocation table",
            ports_allocated.clone(),
        );

        let setup_total = Family::<ResultLabels, Counter>::default();
        registry.register(
            "setup",
            "Port mapping setup calls by outcome",
            setup_total.clone(),
        );

        let release_total = Counter::default();
        registry.register(
            "release",
            "Port mapping teardown calls",
            release_total.clone(),
        );

        let rollbacks_total = Counter::default();
        registry.register(
            "rollbacks",
            "Mappings whose partial allocations were rolled back",
            rollbacks_total.clone(),
        );

        let rule_errors_total = Family::<OpLabels, Counter>::default();
        registry.register(
            "rule_errors",
            "Rule engine failures by operation",
            rule_errors_total.clone(),
        );

        Self {
            registry,
            ports_allocated,
            setup_total,
            release_total,
            rollbacks_total,
            rule_errors_total,
        }
    }

    /// Render the registry in OpenMetrics text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// ── Sub-trait implementations ──────────────────────────────────────

impl AllocationMetrics for AgentMetrics {
    fn set_ports_allocated(&self, protocol: &str, count: u64) {
        self.ports_allocated
            .get_or_create(&ProtocolLabels {
                protocol: protocol.to_string(),
            })
            .set(count.try_into().unwrap_or(i64::MAX));
    }

    fn record_rollback(&self) {
        self.rollbacks_total.inc();
    }
}

impl RuleMetrics for AgentMetrics {
    fn record_setup(&self, result: &str) {
        self.setup_total
            .get_or_create(&ResultLabels {
                result: result.to_string(),
            })
            .inc();
    }

    fn record_release(&self) {
        self.release_total.inc();
    }

    fn record_rule_error(&self, op: &str) {
        self.rule_errors_total
            .get_or_create(&OpLabels { op: op.to_string() })
            .inc();
    }
}
