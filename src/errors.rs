use thiserror::Error;

use crate::window::{LegacyId, ObjectRef, WindowHandle};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The registry handed out a handle that a different live window already owns.
    #[error("window handle {handle} is already bound to {existing} (requested by {requested})")]
    DuplicateHandle {
        handle: WindowHandle,
        existing: ObjectRef,
        requested: ObjectRef,
    },

    /// A record for this window already exists; it is never replaced in place.
    #[error("window {object} is already recorded")]
    DuplicateObject { object: ObjectRef },

    /// A legacy id was claimed by two live windows, or rebound on one window.
    #[error("legacy id {legacy} is owned by {owner} (requested by {requested})")]
    IdentityConflict {
        legacy: LegacyId,
        owner: ObjectRef,
        requested: ObjectRef,
    },

    #[error("failed to attach subscription for {object}: {reason}")]
    AttachFailed { object: ObjectRef, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("event loop error: {0}")]
    EventLoop(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("malformed control line `{line}`: {reason}")]
    Protocol { line: String, reason: String },
}

impl BridgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn protocol(line: &str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            line: line.to_owned(),
            reason: reason.into(),
        }
    }

    /// Invariant violations reported by a collaborator or source, as opposed to
    /// local failures that a later notification can repair.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateHandle { .. }
                | Self::DuplicateObject { .. }
                | Self::IdentityConflict { .. }
        )
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
