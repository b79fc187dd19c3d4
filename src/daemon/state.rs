//! Orchestrator state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the orchestrator is in its poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    /// Constructed, not started
    #[default]
    Idle,
    /// Listing candidate directories on every server
    Polling,
    /// Draining a download batch
    Acquiring,
    /// Validating, transcoding and archiving a batch
    Ingesting,
    /// Waiting for the next poll cycle
    Sleeping,
    /// Stop requested, releasing workers
    ShuttingDown,
    /// Terminal
    Stopped,
}

impl DaemonState {
    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: DaemonState) -> bool {
        use DaemonState::*;

        match (self, next) {
            (Stopped, _) => false,
            (ShuttingDown, Stopped) => true,
            (ShuttingDown, _) => false,
            (_, ShuttingDown) => true,
            (Idle, Polling)
            | (Polling, Acquiring)
            | (Acquiring, Ingesting)
            | (Acquiring, Sleeping)
            | (Ingesting, Acquiring)
            | (Ingesting, Sleeping)
            | (Sleeping, Polling) => true,
            _ => false,
        }
    }

    /// Whether the daemon has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, DaemonState::Stopped)
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DaemonState::Idle => "idle",
            DaemonState::Polling => "polling",
            DaemonState::Acquiring => "acquiring",
            DaemonState::Ingesting => "ingesting",
            DaemonState::Sleeping => "sleeping",
            DaemonState::ShuttingDown => "shutting_down",
            DaemonState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
