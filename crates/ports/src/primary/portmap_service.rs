use std::net::Ipv4Addr;

use domain::portmap::entity::PortMapping;
use domain::portmap::error::PortMapError;

/// Primary port for installing and removing a container's port mappings.
///
/// Implemented by `PortMapAppService` in the application layer.
pub trait PortMapService: Send + Sync {
    /// Install rules and allocate host ports for `mappings`.
    ///
    /// Each mapping's allocations are all-or-nothing. The batch is not:
    /// mappings applied before a failing one stay applied.
    fn setup_port_maps(
        &self,
        container_ip: Ipv4Addr,
        mappings: &[PortMapping],
    ) -> Result<(), PortMapError>;

    /// Best-effort removal of rules and allocations for `mappings`.
    fn release_port_maps(&self, container_ip: Ipv4Addr, mappings: &[PortMapping]);
}
