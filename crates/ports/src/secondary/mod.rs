pub mod metrics_port;
pub mod port_allocator_port;
pub mod rule_engine_port;
