use std::net::Ipv4Addr;
use std::sync::{PoisonError, RwLock};

use domain::common::entity::Protocol;
use domain::portmap::allocation::{PortAllocationTable, PortBinding};
use domain::portmap::error::PortMapError;
use ports::secondary::port_allocator_port::PortAllocatorPort;

/// Process-wide allocation table behind a single `RwLock`.
///
/// `allocate` checks and inserts under one write guard.
#[derive(Default)]
pub struct SharedPortAllocator {
    table: RwLock<PortAllocationTable>,
}

impl SharedPortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every binding, sorted by protocol then host port.
    pub fn entries(&self) -> Vec<(Protocol, u16, PortBinding)> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
    }
}

impl PortAllocatorPort for SharedPortAllocator {
    fn allocate(
        &self,
        protocol: Protocol,
        host_port: u16,
        container_ip: Ipv4Addr,
        container_port: u16,
    ) -> Result<(), PortMapError> {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .allocate(protocol, host_port, container_ip, container_port)
    }

    fn release(&self, protocol: Protocol, host_port: u16) -> Result<(), PortMapError> {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .release(protocol, host_port)
            .map(|_| ())
    }

    fn lookup(&self, protocol: Protocol, host_port: u16) -> Option<PortBinding> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(protocol, host_port)
    }

    fn is_allocated(&self, protocol: Protocol, host_port: u16) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_allocated(protocol, host_port)
    }

    fn allocated_count(&self, protocol: Protocol) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .count(protocol)
    }
}
