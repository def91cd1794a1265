//! MediaCI Core
//!
//! Domain types, the build-specification registry, and the port traits
//! shared by the scheduler, the runners and the CLI. Everything in here is
//! plain data or a trait; nothing performs I/O except registry loading.

pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod ports;
pub mod registry;
pub mod spec;
pub mod stage;

pub use error::{Error, Result};
pub use ids::*;
