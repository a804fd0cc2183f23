//! Network services
pub mod memory;
