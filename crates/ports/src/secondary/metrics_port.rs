// Focused sub-traits for recording Prometheus metrics.
//
// All methods take `&self` because the underlying implementation uses
// atomic operations (interior mutability via `prometheus-client`).
//
// Default implementations are no-ops, allowing test mocks to implement
// only the sub-traits relevant to the service under test.

// ── Allocation table metrics ───────────────────────────────────────

pub trait AllocationMetrics: Send + Sync {
    /// Set the number of host ports currently allocated for a protocol.
    fn set_ports_allocated(&self, _protocol: &str, _count: u64) {}

    /// Record a mapping whose partial allocations were rolled back.
    fn record_rollback(&self) {}
}

// ── Rule engine / transaction metrics ──────────────────────────────

pub trait RuleMetrics: Send + Sync {
    /// Record the outcome of a setup call (`ok`, `existing`, `error`).
    fn record_setup(&self, _result: &str) {}

    /// Record a completed teardown call.
    fn record_release(&self) {}

    /// Record a rule engine failure for an operation
    /// (`insert_redirect`, `insert_forward`, `delete_redirect`, `delete_forward`).
    fn record_rule_error(&self, _op: &str) {}
}

// ── Composite super-trait ──────────────────────────────────────────

/// Unified metrics port composing the sub-traits.
///
/// Services accept `Arc<dyn MetricsPort>`.
pub trait MetricsPort: AllocationMetrics + RuleMetrics {}

/// Blanket implementation: any type implementing all sub-traits automatically
/// implements `MetricsPort`.
impl<T> MetricsPort for T where T: AllocationMetrics + RuleMetrics {}
