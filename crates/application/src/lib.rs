#![forbid(unsafe_code)]

pub mod portmap_service_impl;
