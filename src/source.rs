//! The external notification source as seen by the bridge.
//!
//! Notifications themselves are delivered asynchronously through the event
//! loop channels; this trait only covers subscription management and the
//! synchronous "query current value" calls.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, bail};
use bitflags::bitflags;

use crate::window::ObjectRef;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SourceSet: u8 {
        const LAUNCHER_ITEMS = 1 << 0;
        const LAUNCHER_VISIBILITY = 1 << 1;
        const WM_SWITCHER = 1 << 2;
        const COMPOSITOR_WINDOWS = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalTopic {
    LauncherItems,
    LauncherVisibility,
    WmSwitcher,
    CompositorWindows,
}

impl GlobalTopic {
    pub const ALL: [GlobalTopic; 4] = [
        GlobalTopic::LauncherItems,
        GlobalTopic::LauncherVisibility,
        GlobalTopic::WmSwitcher,
        GlobalTopic::CompositorWindows,
    ];

    pub fn flag(self) -> SourceSet {
        match self {
            GlobalTopic::LauncherItems => SourceSet::LAUNCHER_ITEMS,
            GlobalTopic::LauncherVisibility => SourceSet::LAUNCHER_VISIBILITY,
            GlobalTopic::WmSwitcher => SourceSet::WM_SWITCHER,
            GlobalTopic::CompositorWindows => SourceSet::COMPOSITOR_WINDOWS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GlobalTopic::LauncherItems => "launcher-items",
            GlobalTopic::LauncherVisibility => "launcher-visibility",
            GlobalTopic::WmSwitcher => "wm-switcher",
            GlobalTopic::CompositorWindows => "compositor-windows",
        }
    }
}

pub trait NotificationSource: Send {
    fn subscribe_window(&mut self, object: &ObjectRef) -> anyhow::Result<()>;
    fn unsubscribe_window(&mut self, object: &ObjectRef);
    fn subscribe_global(&mut self, topic: GlobalTopic) -> anyhow::Result<()>;
    fn unsubscribe_global(&mut self, topic: GlobalTopic);

    fn is_showing_desktop(&self) -> bool;
    /// Raw id of the active window in handle space; 0 when nothing is active.
    fn active_window(&self) -> u32;
    fn current_wm(&self) -> Option<String>;
}

#[derive(Debug, Default)]
struct SourceState {
    windows: HashSet<ObjectRef>,
    rejected: HashSet<ObjectRef>,
    globals: SourceSet,
    showing_desktop: bool,
    active_window: u32,
    current_wm: Option<String>,
    unavailable: bool,
}

/// In-process source whose query values are pushed by whoever feeds the
/// bridge (the control socket in the daemon, scripts in tests).
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    state: Arc<Mutex<SourceState>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SourceState> {
        // Poisoning leaves the plain values intact.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_showing_desktop(&self, showing: bool) {
        self.lock().showing_desktop = showing;
    }

    pub fn set_active_window(&self, raw: u32) {
        self.lock().active_window = raw;
    }

    pub fn set_current_wm(&self, name: impl Into<String>) {
        self.lock().current_wm = Some(name.into());
    }

    /// Makes subscriptions for `object` fail, as if it vanished on the bus.
    pub fn reject(&self, object: &ObjectRef) {
        self.lock().rejected.insert(object.clone());
    }

    pub fn accept(&self, object: &ObjectRef) {
        self.lock().rejected.remove(object);
    }

    /// Makes every subscription attempt fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn is_subscribed(&self, object: &ObjectRef) -> bool {
        self.lock().windows.contains(object)
    }

    pub fn window_subscriptions(&self) -> usize {
        self.lock().windows.len()
    }

    pub fn globals(&self) -> SourceSet {
        self.lock().globals
    }
}

impl NotificationSource for MemorySource {
    fn subscribe_window(&mut self, object: &ObjectRef) -> anyhow::Result<()> {
        let mut state = self.lock();
        if state.unavailable {
            bail!("notification source is unavailable");
        }
        if state.rejected.contains(object) {
            return Err(anyhow!("object {object} does not exist"));
        }
        state.windows.insert(object.clone());
        Ok(())
    }

    fn unsubscribe_window(&mut self, object: &ObjectRef) {
        self.lock().windows.remove(object);
    }

    fn subscribe_global(&mut self, topic: GlobalTopic) -> anyhow::Result<()> {
        let mut state = self.lock();
        if state.unavailable {
            bail!("notification source is unavailable");
        }
        state.globals |= topic.flag();
        Ok(())
    }

    fn unsubscribe_global(&mut self, topic: GlobalTopic) {
        self.lock().globals.remove(topic.flag());
    }

    fn is_showing_desktop(&self) -> bool {
        self.lock().showing_desktop
    }

    fn active_window(&self) -> u32 {
        self.lock().active_window
    }

    fn current_wm(&self) -> Option<String> {
        self.lock().current_wm.clone()
    }
}
