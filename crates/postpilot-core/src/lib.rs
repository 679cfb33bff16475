//! # PostPilot Core
//!
//! Shared foundation for the PostPilot workspace: the error type, the TOML
//! configuration system, and the capability abstraction that the orchestrator
//! and scheduler invoke external operations through.

pub mod capability;
pub mod config;
pub mod error;

pub use capability::{Capability, CapabilityRegistry};
pub use config::PostPilotConfig;
pub use error::{PostPilotError, Result};
