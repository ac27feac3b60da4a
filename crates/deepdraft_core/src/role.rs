//! Which configured model a call site wants.

use serde::{Deserialize, Serialize};

/// The purpose a generation serves, used to pick the preferred model from settings.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelRole {
    /// Long-form reasoning and drafting
    Thinking,
    /// Search-grounded research tasks
    Networking,
}
