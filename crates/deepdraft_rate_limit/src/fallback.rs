//! Choosing the least-impaired model from a fallback chain.

use deepdraft_error::{ConfigError, ConfigErrorKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Why a model may be a poor choice right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Impairment {
    /// Daily ceiling reached
    pub exhausted: bool,
    /// In cooldown, or minute window full
    pub cooling: bool,
    /// Provider confirmed the model is gone
    pub unavailable: bool,
}

impl Impairment {
    /// No impairment at all.
    pub fn is_clear(&self) -> bool {
        !self.exhausted && !self.cooling && !self.unavailable
    }

    /// Sort key among usable models: fresh, then cooling, then exhausted,
    /// then exhausted and cooling.
    fn rank(&self) -> (bool, bool) {
        (self.exhausted, self.cooling)
    }
}

/// Ordered, non-empty list of models to try when the preferred one is impaired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackChain {
    models: Vec<String>,
}

impl FallbackChain {
    /// Build a chain.
    ///
    /// Duplicate entries are dropped, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigErrorKind::EmptyFallbackChain`] if `models` is empty.
    pub fn new<I, S>(models: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for model in models {
            let model = model.into();
            if !unique.contains(&model) {
                unique.push(model);
            }
        }

        if unique.is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::EmptyFallbackChain));
        }
        Ok(Self { models: unique })
    }

    /// Models in priority order.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Whether `model` is in the chain.
    pub fn contains(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// Pick a model to use instead of `preferred`.
    ///
    /// See [`select_fallback`].
    pub fn fallback<F>(&self, preferred: &str, impairment: F) -> Option<String>
    where
        F: Fn(&str) -> Impairment,
    {
        select_fallback(self, preferred, impairment)
    }

    /// `preferred` when it is unimpaired, otherwise its fallback.
    ///
    /// Returns `None` only when every candidate is unavailable.
    pub fn resolve<F>(&self, preferred: &str, impairment: F) -> Option<Resolution>
    where
        F: Fn(&str) -> Impairment,
    {
        let own = impairment(preferred);
        if own.is_clear() {
            return Some(Resolution {
                model: preferred.to_string(),
                fell_back: false,
                impairment: own,
            });
        }

        let model = select_fallback(self, preferred, &impairment)?;
        let fell_back = model != preferred;
        let chosen = impairment(&model);
        if fell_back {
            debug!(preferred, fallback = %model, "Falling back to another model");
        }
        Some(Resolution {
            model,
            fell_back,
            impairment: chosen,
        })
    }
}

/// Outcome of resolving a preferred model against the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Resolution {
    /// Model to dispatch to
    model: String,
    /// Whether `model` differs from the preferred model
    fell_back: bool,
    /// Impairment of `model` at resolution time
    impairment: Impairment,
}

/// Least-impaired alternative to `preferred`.
///
/// Candidates are the chain entries other than `preferred`, minus unavailable
/// ones, ordered by `(exhausted, cooling)` with chain order breaking ties.
/// `preferred` itself is returned only when it is not unavailable and no
/// other candidate ranks at least as well. Never returns an unavailable model.
///
/// # Example
///
/// ```
/// use deepdraft_rate_limit::{FallbackChain, Impairment, select_fallback};
///
/// let chain = FallbackChain::new(["gemini-2.5-pro", "gemini-2.5-flash", "gemini-2.0-flash"]).unwrap();
/// let pick = select_fallback(&chain, "gemini-2.5-pro", |model| Impairment {
///     cooling: model == "gemini-2.5-flash",
///     ..Impairment::default()
/// });
/// assert_eq!(pick.as_deref(), Some("gemini-2.0-flash"));
/// ```
pub fn select_fallback<F>(chain: &FallbackChain, preferred: &str, impairment: F) -> Option<String>
where
    F: Fn(&str) -> Impairment,
{
    let best_other = chain
        .models()
        .iter()
        .filter(|model| model.as_str() != preferred)
        .map(|model| (model, impairment(model)))
        .filter(|(_, state)| !state.unavailable)
        .min_by_key(|(_, state)| state.rank());

    let own = impairment(preferred);
    match best_other {
        Some((_, state)) if !own.unavailable && own.rank() < state.rank() => {
            Some(preferred.to_string())
        }
        Some((model, _)) => Some(model.clone()),
        None if !own.unavailable => Some(preferred.to_string()),
        None => None,
    }
}
