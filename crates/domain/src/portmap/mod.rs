//! Host-to-container port mapping: range model, rule generation and the
//! host port allocation table.

pub mod allocation;
pub mod entity;
pub mod error;
pub mod rules;
