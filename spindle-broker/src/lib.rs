//! Broker transports for Spindle
//!
//! The engine only depends on the [`spindle_interfaces::Broker`] trait.
//! This crate ships the in-process transport used by single-node
//! deployments, the demo server and the test suites.

pub mod memory;

pub use memory::{InMemoryBroker, InMemoryBrokerConfig};
pub use spindle_interfaces::{Broker, BrokerError, DeliveryHandler};
