//! Core data types for Deepdraft.
//!
//! This crate provides the plain data passed between the orchestrator, the
//! provider client and the UI layer. Nothing here talks to the network.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod chunk;
mod request;
mod role;
mod settings;
mod telemetry;

pub use chunk::StreamChunk;
pub use request::{GenerateRequest, GenerateRequestBuilder, GenerateRequestBuilderError};
pub use role::ModelRole;
pub use settings::Settings;
pub use telemetry::{DEFAULT_LOG_FILTER, init_tracing};
