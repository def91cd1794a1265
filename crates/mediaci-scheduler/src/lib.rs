//! Build selection, stage planning and orchestration for MediaCI.
//!
//! Planning is pure: [`engine`] maps a change to the builds it needs and the
//! stage commands of each build. Execution lives in [`orchestrator`], which
//! consumes those plans and drives the external executor.

pub mod engine;
pub mod factory;
pub mod flow;
pub mod orchestrator;
pub mod pools;
pub mod reporter;
pub mod triggers;

pub use engine::{DecisionEngine, FanOut};
pub use orchestrator::{EventReport, EventState, Orchestrator};
