//! The dock/taskbar state owner the bridge reports to.

use crate::window::{WindowField, WindowHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityHint {
    /// The launcher was shown or hidden.
    LauncherVisible(bool),
    /// Something the dock hides behind changed; recompute the hide state now.
    Refresh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LauncherItemStatus {
    Created,
    Updated,
    Deleted,
}

impl LauncherItemStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

pub trait Dock: Send {
    fn on_window_discovered(&mut self, handle: WindowHandle);
    fn on_window_removed(&mut self, handle: WindowHandle);
    /// Whether a title or icon change matters for the owning entry is the
    /// dock's decision.
    fn on_property_changed(&mut self, handle: WindowHandle, field: WindowField);
    fn on_active_window_changed(&mut self, handle: WindowHandle);
    fn on_visibility_hint(&mut self, hint: VisibilityHint);
    fn on_global_mode_changed(&mut self, name: &str);
    fn on_launcher_item_deleted(&mut self, path: &str);
    fn on_launcher_item_updated(&mut self, path: &str);
}

/// Dock that only logs what it is told. Used by the daemon when no real dock
/// is attached.
#[derive(Debug, Default)]
pub struct LogDock;

impl Dock for LogDock {
    fn on_window_discovered(&mut self, handle: WindowHandle) {
        tracing::info!(%handle, "window discovered");
    }

    fn on_window_removed(&mut self, handle: WindowHandle) {
        tracing::info!(%handle, "window removed");
    }

    fn on_property_changed(&mut self, handle: WindowHandle, field: WindowField) {
        tracing::info!(%handle, %field, "window property changed");
    }

    fn on_active_window_changed(&mut self, handle: WindowHandle) {
        tracing::info!(%handle, "active window changed");
    }

    fn on_visibility_hint(&mut self, hint: VisibilityHint) {
        tracing::info!(?hint, "visibility hint");
    }

    fn on_global_mode_changed(&mut self, name: &str) {
        tracing::info!(wm = name, "window manager changed");
    }

    fn on_launcher_item_deleted(&mut self, path: &str) {
        tracing::info!(path, "launcher item deleted");
    }

    fn on_launcher_item_updated(&mut self, path: &str) {
        tracing::info!(path, "launcher item updated");
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DockEvent {
    WindowDiscovered(WindowHandle),
    WindowRemoved(WindowHandle),
    PropertyChanged(WindowHandle, WindowField),
    ActiveWindowChanged(WindowHandle),
    VisibilityHint(VisibilityHint),
    GlobalModeChanged(String),
    LauncherItemDeleted(String),
    LauncherItemUpdated(String),
}

/// Dock that records every call, in order, into a shared log.
#[derive(Clone, Debug, Default)]
pub struct RecordingDock {
    events: std::sync::Arc<std::sync::Mutex<Vec<DockEvent>>>,
}

impl RecordingDock {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: DockEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<DockEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn take(&self) -> Vec<DockEvent> {
        std::mem::take(
            &mut *self
                .events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl Dock for RecordingDock {
    fn on_window_discovered(&mut self, handle: WindowHandle) {
        self.push(DockEvent::WindowDiscovered(handle));
    }

    fn on_window_removed(&mut self, handle: WindowHandle) {
        self.push(DockEvent::WindowRemoved(handle));
    }

    fn on_property_changed(&mut self, handle: WindowHandle, field: WindowField) {
        self.push(DockEvent::PropertyChanged(handle, field));
    }

    fn on_active_window_changed(&mut self, handle: WindowHandle) {
        self.push(DockEvent::ActiveWindowChanged(handle));
    }

    fn on_visibility_hint(&mut self, hint: VisibilityHint) {
        self.push(DockEvent::VisibilityHint(hint));
    }

    fn on_global_mode_changed(&mut self, name: &str) {
        self.push(DockEvent::GlobalModeChanged(name.to_owned()));
    }

    fn on_launcher_item_deleted(&mut self, path: &str) {
        self.push(DockEvent::LauncherItemDeleted(path.to_owned()));
    }

    fn on_launcher_item_updated(&mut self, path: &str) {
        self.push(DockEvent::LauncherItemUpdated(path.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launcher_status_parse() {
        assert_eq!(
            LauncherItemStatus::parse("deleted"),
            Some(LauncherItemStatus::Deleted)
        );
        assert_eq!(LauncherItemStatus::parse("Deleted"), None);
        assert_eq!(LauncherItemStatus::parse(""), None);
    }

    #[test]
    fn test_recording_dock_keeps_order() {
        let mut dock = RecordingDock::new();
        let handle = WindowHandle::new(3).unwrap();
        dock.on_window_discovered(handle);
        dock.on_property_changed(handle, WindowField::Title);

        assert_eq!(
            dock.take(),
            vec![
                DockEvent::WindowDiscovered(handle),
                DockEvent::PropertyChanged(handle, WindowField::Title),
            ]
        );
        assert!(dock.events().is_empty());
    }
}
