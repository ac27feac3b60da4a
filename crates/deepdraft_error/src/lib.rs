//! Error types for Deepdraft.
//!
//! This crate provides the error taxonomy shared by every Deepdraft crate.
//!
//! # Error Hierarchy
//!
//! Errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - Constructors use `#[track_caller]` for automatic location capture
//!
//! The orchestration taxonomy mirrors what a user can act on:
//!
//! | Kind | Meaning | Retried internally |
//! |---|---|---|
//! | `RateLimited` | provider signalled 429/503 | yes, after a cooldown |
//! | `QuotaExhausted` | local daily ceiling reached | no, triggers fallback |
//! | `ModelUnavailable` | provider says the model is gone | never on that model |
//! | `NoAvailableModel` | every candidate is impaired | no |
//! | `GenerationFailure` | any other provider/network failure | yes, exponential backoff |
//!
//! # Examples
//!
//! ```
//! use deepdraft_error::{DeepdraftResult, ProviderError};
//!
//! fn call_provider() -> DeepdraftResult<String> {
//!     Err(ProviderError::http(500, "Internal error"))?
//! }
//!
//! assert!(call_provider().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod orchestration;
mod provider;

pub use config::{ConfigError, ConfigErrorKind};
pub use error::{DeepdraftError, DeepdraftErrorKind, DeepdraftResult};
pub use orchestration::{OrchestrationError, OrchestrationErrorKind};
pub use provider::{ProviderError, ProviderErrorKind};
