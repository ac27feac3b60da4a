//! Request orchestration for Deepdraft.
//!
//! Every generation request goes through an [`Orchestrator`], which picks the
//! model to use from the shared [`RateLimitRegistry`](deepdraft_rate_limit::RateLimitRegistry),
//! records usage before dispatch, and reacts to provider errors:
//!
//! - rate limits put the model into cooldown and the request is re-resolved
//! - "model not found" marks the model unavailable and moves to the next one
//! - other failures are retried with exponential backoff
//!
//! The two retry budgets are tracked separately (see [`RetryPolicies`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod metrics;
mod orchestrator;
mod queue;
mod retry;

pub use metrics::OrchestratorMetrics;
pub use orchestrator::{Generation, Orchestrator};
pub use queue::{WorkPermit, WorkQueue};
pub use retry::{BackoffPolicy, RateLimitPolicy, RetryPolicies};
