//! Testing utilities and mock implementations
//!
//! Provides mock MessageBus and WanProbe implementations to enable
//! comprehensive testing without a broker or network access.

pub mod mocks;

pub use mocks::{MockBus, MockProbe};
