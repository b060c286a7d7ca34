//! Worker lifecycle states.

use std::fmt;

/// Lifecycle of one cache manager instance.
///
/// `Installed` is the waiting state: the new generation is seeded but the
/// previous worker (if any) still serves pages until activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, or a failed install rolled back.
    Parsed,
    Installing,
    /// Seeded and waiting to activate.
    Installed,
    Activating,
    /// Serving fetches.
    Activated,
}

impl WorkerState {
    /// Only an activated worker intercepts fetches; before that requests go
    /// straight to the network.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, WorkerState::Installed)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
        }
    }
}
