//! Deepdraft - client-side rate limiting and model fallback.
//!
//! Deepdraft sits between every generation request and a language-model
//! provider. It tracks per-model usage against requests-per-minute and
//! requests-per-day ceilings, cools models down after rate-limit signals,
//! remembers models the provider has retired, and reroutes requests along a
//! configured fallback chain.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use deepdraft::{Deepdraft, GenerateRequest, ModelRole, Settings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     deepdraft::init_tracing()?;
//!     let app = Deepdraft::load(Arc::new(MyGeminiClient::new()))?;
//!
//!     let generation = app
//!         .generate(&Settings::default(), ModelRole::Thinking, &GenerateRequest::new("Draft an intro"), None)
//!         .await?;
//!     println!("{}", generation.text());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `deepdraft_error` - error types
//! - `deepdraft_core` - requests, stream chunks, settings, tracing setup
//! - `deepdraft_interface` - provider and settings traits
//! - `deepdraft_rate_limit` - quotas, usage, cooldowns, fallback, configuration
//! - `deepdraft_orchestrator` - the request state machine and retry policies
//!
//! This crate re-exports everything and provides [`Deepdraft`], the
//! composition root that owns the one shared registry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod app;

pub use app::Deepdraft;

pub use deepdraft_core::*;
pub use deepdraft_error::*;
pub use deepdraft_interface::*;
pub use deepdraft_orchestrator::*;
pub use deepdraft_rate_limit::*;
