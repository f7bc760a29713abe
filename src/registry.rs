use std::collections::HashMap;

use crate::window::{ObjectRef, WindowHandle};

/// Owner of window registrations. The bridge only consumes the handles it
/// hands out.
pub trait WindowRegistry: Send {
    fn register_window(&mut self, object: &ObjectRef) -> WindowHandle;
    fn unregister_window(&mut self, handle: WindowHandle);
}

/// Hands out increasing handles, skipping zero and handles still registered.
#[derive(Debug)]
pub struct SequentialRegistry {
    next: u32,
    live: HashMap<WindowHandle, ObjectRef>,
}

impl Default for SequentialRegistry {
    fn default() -> Self {
        Self {
            next: 1,
            live: HashMap::new(),
        }
    }
}

impl SequentialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn object_for(&self, handle: WindowHandle) -> Option<&ObjectRef> {
        self.live.get(&handle)
    }

    fn next_free(&mut self) -> WindowHandle {
        loop {
            let raw = self.next;
            self.next = self.next.wrapping_add(1);
            if let Some(handle) = WindowHandle::new(raw)
                && !self.live.contains_key(&handle)
            {
                return handle;
            }
        }
    }
}

impl WindowRegistry for SequentialRegistry {
    fn register_window(&mut self, object: &ObjectRef) -> WindowHandle {
        let handle = self.next_free();
        self.live.insert(handle, object.clone());
        tracing::trace!(object = %object, %handle, "registered window");
        handle
    }

    fn unregister_window(&mut self, handle: WindowHandle) {
        if self.live.remove(&handle).is_none() {
            tracing::debug!(%handle, "unregistering unknown window handle");
        }
    }
}
