//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Relay actuation for load shedding."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::Result;

/// Output stage that disconnects the shed load.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Open the relay, cutting the load.
    async fn trigger_off(&self) -> Result<()>;
}

/// Relay placeholder. A GPIO toggle goes here on hardware; this only counts calls.
#[derive(Debug, Default)]
pub struct StubRelay {
    triggers: AtomicU64,
}

impl StubRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times [`Relay::trigger_off`] has been invoked.
    pub fn trigger_count(&self) -> u64 {
        self.triggers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Relay for StubRelay {
    async fn trigger_off(&self) -> Result<()> {
        let count = self.triggers.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(count, "stub relay triggered off");
        Ok(())
    }
}
