//! Capability abstraction — named external operations the orchestrator invokes.
//!
//! A capability is the seam between the orchestration core and the rest of
//! the product: post generation, email delivery, CRM updates all live behind
//! this trait. The core only knows names and parameter maps.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PostPilotError, Result};

/// A named external operation.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Registry name, e.g. "generate_posts" or "send_email".
    fn name(&self) -> &str;

    /// Invoke with a JSON parameter object; returns a JSON result.
    async fn invoke(&self, params: &serde_json::Value) -> Result<serde_json::Value>;
}

/// Explicit name → capability registry.
///
/// Lookup of an unregistered name is a typed `CapabilityNotFound` error, not
/// a generic failure — callers can tell a missing wiring from a failed call.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
        }
    }

    /// Register a capability under its own name. Re-registering replaces.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        tracing::debug!("🔌 Capability registered: {name}");
        self.capabilities.insert(name, capability);
    }

    /// Look up a capability by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Capability>> {
        self.capabilities
            .get(name)
            .cloned()
            .ok_or_else(|| PostPilotError::CapabilityNotFound(name.to_string()))
    }

    /// Invoke a capability by name.
    pub async fn invoke(&self, name: &str, params: &serde_json::Value) -> Result<serde_json::Value> {
        let capability = self.get(name)?;
        capability.invoke(params).await
    }

    /// Registered capability names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
