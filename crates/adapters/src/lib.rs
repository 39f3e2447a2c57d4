#![deny(unsafe_code)]

pub mod allocator;
pub mod iptables;
