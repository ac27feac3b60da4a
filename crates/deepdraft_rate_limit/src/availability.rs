//! Models the provider has confirmed are gone.

use dashmap::DashSet;
use tracing::{info, instrument};

/// Session-long set of unavailable models.
///
/// Entries are never removed; a retired model stays retired until the
/// registry is dropped.
#[derive(Debug, Default)]
pub struct UnavailabilityRegistry {
    models: DashSet<String>,
}

impl UnavailabilityRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag `model` as unavailable.
    ///
    /// Returns `true` if the model was not flagged before. Flagging twice has
    /// no further effect.
    #[instrument(skip(self))]
    pub fn mark_unavailable(&self, model: &str) -> bool {
        let newly = self.models.insert(model.to_string());
        if newly {
            info!("Model marked unavailable for this session");
        }
        newly
    }

    /// Whether `model` has been flagged.
    pub fn is_unavailable(&self, model: &str) -> bool {
        self.models.contains(model)
    }

    /// Every flagged model, sorted.
    pub fn unavailable_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.models.iter().map(|m| m.key().clone()).collect();
        models.sort();
        models
    }
}
