//! skillgraph: Tiered Skill, Agent and Command Runtime
//!
//! Loads declarative component descriptors, matches trigger events to Skills,
//! enforces per-component capability allow-lists, bounds the invocation graph
//! by tier, cycle and depth, and runs Command workflows with timeouts,
//! cancellation and aggregated findings.

pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod invocation;
pub mod logging;
pub mod model;
pub mod registry;
pub mod report;
pub mod runtime;
pub mod sandbox;
pub mod scheduler;
pub mod tooling;
pub mod trigger;
pub mod types;

pub use error::{DispatchError, RuntimeError};
pub use registry::Registry;
pub use report::{Finding, InvocationResult, InvocationStatus, Severity};
pub use runtime::{Outcome, Runtime};
pub use types::{Capability, Tier};
