use std::{collections::HashMap, fmt};

use crate::{
    BridgeError, Result,
    source::{GlobalTopic, NotificationSource, SourceSet},
    window::{ObjectRef, WindowRecord},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Owns the per-window subscriptions plus the fixed set of global ones.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    next_id: u64,
    windows: HashMap<SubscriptionHandle, ObjectRef>,
    globals: SourceSet,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn globals(&self) -> SourceSet {
        self.globals
    }

    pub fn attach(
        &mut self,
        source: &mut dyn NotificationSource,
        record: &WindowRecord,
    ) -> Result<SubscriptionHandle> {
        let object = record.object();
        source
            .subscribe_window(object)
            .map_err(|err| BridgeError::AttachFailed {
                object: object.clone(),
                reason: format!("{err:#}"),
            })?;

        self.next_id += 1;
        let handle = SubscriptionHandle(self.next_id);
        self.windows.insert(handle, object.clone());
        tracing::debug!(object = %object, subscription = %handle, "attached window subscription");
        Ok(handle)
    }

    /// Releases a window subscription. Returns `false` when it was already
    /// released.
    pub fn detach(&mut self, source: &mut dyn NotificationSource, handle: SubscriptionHandle) -> bool {
        let Some(object) = self.windows.remove(&handle) else {
            tracing::trace!(subscription = %handle, "subscription already detached");
            return false;
        };

        source.unsubscribe_window(&object);
        tracing::debug!(object = %object, subscription = %handle, "detached window subscription");
        true
    }

    /// Brings the global subscriptions in line with `wanted`. Topics that fail
    /// to attach are logged and left out.
    pub fn attach_globals(
        &mut self,
        source: &mut dyn NotificationSource,
        wanted: SourceSet,
    ) -> SourceSet {
        for topic in GlobalTopic::ALL {
            let flag = topic.flag();
            let attached = self.globals.contains(flag);

            if wanted.contains(flag) && !attached {
                match source.subscribe_global(topic) {
                    Ok(()) => {
                        self.globals |= flag;
                        tracing::info!(topic = topic.as_str(), "subscribed to global source");
                    }
                    Err(err) => {
                        tracing::warn!(topic = topic.as_str(), "failed to subscribe: {err:#}");
                    }
                }
            } else if !wanted.contains(flag) && attached {
                source.unsubscribe_global(topic);
                self.globals.remove(flag);
                tracing::info!(topic = topic.as_str(), "unsubscribed from global source");
            }
        }

        self.globals
    }

    pub fn detach_all(&mut self, source: &mut dyn NotificationSource) {
        let handles: Vec<SubscriptionHandle> = self.windows.keys().copied().collect();
        for handle in handles {
            self.detach(source, handle);
        }
        self.attach_globals(source, SourceSet::empty());
    }
}
