use std::collections::HashMap;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::common::entity::Protocol;

use super::error::PortMapError;

/// Where an allocated host port is forwarded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortBinding {
    pub container_ip: Ipv4Addr,
    pub container_port: u16,
}

/// Table of allocated host ports, keyed by `(protocol, host_port)`.
///
/// A key holds at most one binding. Not synchronised; wrap it in a lock when
/// it is shared between callers.
#[derive(Debug, Default)]
pub struct PortAllocationTable {
    entries: HashMap<(Protocol, u16), PortBinding>,
}

impl PortAllocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `host_port` to `container_ip:container_port`.
    ///
    /// Fails without mutating if the key is already bound.
    pub fn allocate(
        &mut self,
        protocol: Protocol,
        host_port: u16,
        container_ip: Ipv4Addr,
        container_port: u16,
    ) -> Result<(), PortMapError> {
        match self.entries.entry((protocol, host_port)) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(PortMapError::AlreadyAllocated {
                    protocol,
                    port: host_port,
                })
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(PortBinding {
                    container_ip,
                    container_port,
                });
                Ok(())
            }
        }
    }

    /// Remove the binding for `host_port`, returning it.
    pub fn release(
        &mut self,
        protocol: Protocol,
        host_port: u16,
    ) -> Result<PortBinding, PortMapError> {
        self.entries
            .remove(&(protocol, host_port))
            .ok_or(PortMapError::NotAllocated {
                protocol,
                port: host_port,
            })
    }

    pub fn lookup(&self, protocol: Protocol, host_port: u16) -> Option<PortBinding> {
        self.entries.get(&(protocol, host_port)).copied()
    }

    pub fn is_allocated(&self, protocol: Protocol, host_port: u16) -> bool {
        self.entries.contains_key(&(protocol, host_port))
    }

    /// Number of bindings for `protocol`.
    pub fn count(&self, protocol: Protocol) -> usize {
        self.entries.keys().filter(|(p, _)| *p == protocol).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All bindings sorted by protocol then host port.
    pub fn entries(&self) -> Vec<(Protocol, u16, PortBinding)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|(&(proto, port), &binding)| (proto, port, binding))
            .collect();
        out.sort_by_key(|&(proto, port, _)| (proto.as_str(), port));
        out
    }
}
