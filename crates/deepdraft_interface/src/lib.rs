//! Trait definitions for the collaborators the Deepdraft core talks to.
//!
//! The core does not implement a language-model client or a settings store.
//! It consumes them through the traits in this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod traits;

pub use traits::{ChunkStream, GenerationProvider, SettingsStore};
