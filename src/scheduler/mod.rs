//! Execution Scheduler
//!
//! Skills run on a bounded worker pool; Agents run inline in their caller's
//! task; Commands run their workflow DAG with bounded fan-out.

pub mod executor;
pub mod pool;
pub mod workflow;

pub use executor::{Executor, NestedOutcome};
pub use pool::{PoolStats, SkillJob, SkillPool};
pub use workflow::{
    plan_waves, render_template, CommandReport, StepOutcome, StepStatus, TaskRegistry,
    WorkflowRunner,
};
