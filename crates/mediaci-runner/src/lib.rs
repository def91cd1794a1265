//! Stage command execution for MediaCI.
//!
//! Implementations of the `StageExecutor` port: a shell executor that runs
//! commands on the local host and a dry-run executor that only logs them.

pub mod dry_run;
pub mod runner;
pub mod shell;

pub use dry_run::DryRunExecutor;
pub use runner::{OutputLine, OutputStream, RunnerConfig};
pub use shell::ShellStageExecutor;
