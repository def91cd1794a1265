//! Identifiers stamped on change events and build runs.
//!
//! Both are UUID v7 values, so ids created later sort later. The kind
//! marker only decides the display prefix used in log lines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

/// Marker for one family of run identifiers.
pub trait RunKind {
    const PREFIX: &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuildRunKind {}

impl RunKind for EventKind {
    const PREFIX: &'static str = "evt";
}

impl RunKind for BuildRunKind {
    const PREFIX: &'static str = "bld";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct RunId<K> {
    uuid: Uuid,
    #[serde(skip)]
    kind: PhantomData<K>,
}

/// One received change event.
pub type EventId = RunId<EventKind>;
/// One build, trigger or test execution within an event.
pub type BuildRunId = RunId<BuildRunKind>;

impl<K: RunKind> RunId<K> {
    pub fn new() -> Self {
        Self {
            uuid: Uuid::now_v7(),
            kind: PhantomData,
        }
    }
}

impl<K: RunKind> Default for RunId<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RunKind> fmt::Display for RunId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", K::PREFIX, self.uuid.simple())
    }
}
