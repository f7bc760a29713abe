//! Tracks the single active window.
//!
//! Activation notifications name a window in handle space. A window whose
//! legacy id is not bridged yet cannot be reported as active; the dock only
//! gets a hint to refresh its hide state in that case.

use crate::{
    context::BridgeContext,
    dock::VisibilityHint,
    identity::IdentityMap,
    router::Outcome,
    window::{ObjectRef, WindowHandle},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ActiveState {
    #[default]
    NoActive,
    ActiveKnown(ObjectRef),
}

#[derive(Debug, Default)]
pub struct ActiveWindowTracker {
    state: ActiveState,
}

impl ActiveWindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ActiveState {
        &self.state
    }

    pub fn active(&self) -> Option<&ObjectRef> {
        match &self.state {
            ActiveState::NoActive => None,
            ActiveState::ActiveKnown(object) => Some(object),
        }
    }

    /// `target` is `None` when the notification carried no id; the source is
    /// asked for its current active window then.
    pub fn on_activation(
        &mut self,
        ctx: &mut BridgeContext,
        identities: &mut IdentityMap,
        target: Option<WindowHandle>,
    ) -> Outcome {
        let target = target.or_else(|| WindowHandle::new(ctx.source.active_window()));
        let Some(handle) = target else {
            tracing::trace!("activation without a window; ignoring");
            return Outcome::Unchanged;
        };

        let Some(record) = identities.resolve_handle(handle) else {
            tracing::debug!(%handle, "activation for unknown window; dropping");
            return Outcome::Dropped;
        };

        if record.legacy().is_none() {
            tracing::debug!(%handle, object = %record.object(), "active window has no legacy id yet");
            ctx.dock.on_visibility_hint(VisibilityHint::Refresh);
            return Outcome::Emitted;
        }

        let object = record.object().clone();
        if self.active() == Some(&object) && record.is_active() {
            return Outcome::Unchanged;
        }

        // Clear before set so no observer ever sees two active windows.
        if let ActiveState::ActiveKnown(previous) = &self.state
            && previous != &object
            && let Some(previous) = identities.resolve_mut(previous)
        {
            previous.set_active(false);
        }
        if let Some(record) = identities.resolve_mut(&object) {
            record.set_active(true);
        }

        tracing::debug!(%handle, object = %object, "active window changed");
        self.state = ActiveState::ActiveKnown(object);
        ctx.dock.on_active_window_changed(handle);
        Outcome::Emitted
    }

    /// Drops the active reference if it points at `object`.
    pub fn forget(&mut self, object: &ObjectRef) -> bool {
        if self.active() == Some(object) {
            self.state = ActiveState::NoActive;
            return true;
        }
        false
    }
}
