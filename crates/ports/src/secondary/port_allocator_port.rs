use std::net::Ipv4Addr;

use domain::common::entity::Protocol;
use domain::portmap::allocation::PortBinding;
use domain::portmap::error::PortMapError;

/// Secondary port for the process-wide host port allocation table.
///
/// Every method is atomic with respect to the others: `allocate` either
/// inserts the binding or fails with `AlreadyAllocated` and changes nothing.
///
/// Implemented by `SharedPortAllocator` in the adapter layer.
pub trait PortAllocatorPort: Send + Sync {
    fn allocate(
        &self,
        protocol: Protocol,
        host_port: u16,
        container_ip: Ipv4Addr,
        container_port: u16,
    ) -> Result<(), PortMapError>;

    /// Fails with `NotAllocated` when nothing is bound to `host_port`.
    fn release(&self, protocol: Protocol, host_port: u16) -> Result<(), PortMapError>;

    fn lookup(&self, protocol: Protocol, host_port: u16) -> Option<PortBinding>;

    fn is_allocated(&self, protocol: Protocol, host_port: u16) -> bool {
        self.lookup(protocol, host_port).is_some()
    }

    /// Number of host ports currently allocated for `protocol`.
    fn allocated_count(&self, protocol: Protocol) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_allocator_port_is_object_safe() {
        fn _check(port: &dyn PortAllocatorPort) {
            let _ = port.is_allocated(Protocol::Udp, 53);
            let _ = port.allocated_count(Protocol::Tcp);
        }
    }
}
