//! Turns raw notifications into record updates and dock emissions.
//!
//! Sources deliver concurrently and without ordering between each other, so
//! notifications about windows that are not (or no longer) known are dropped
//! instead of being queued or reordered.

use crate::{
    Result,
    active::ActiveWindowTracker,
    context::BridgeContext,
    dock::{LauncherItemStatus, VisibilityHint},
    identity::{IdentityMap, LegacyBinding},
    subscription::SubscriptionManager,
    window::{Change, LegacyId, ObjectRef, PropertyValue, WindowHandle, WindowRecord},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    LifecycleCreated(ObjectRef),
    LifecycleRemoved(ObjectRef),
    PropertyChanged(ObjectRef, PropertyValue),
    GlobalVisibilityChanged(bool),
    GlobalModeChanged(String),
    ActiveWindowChanged(Option<WindowHandle>),
    LegacyResolved(ObjectRef, LegacyId),
    LauncherItemChanged {
        status: LauncherItemStatus,
        path: String,
    },
}

impl BridgeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeEvent::LifecycleCreated(_) => "created",
            BridgeEvent::LifecycleRemoved(_) => "removed",
            BridgeEvent::PropertyChanged(..) => "property",
            BridgeEvent::GlobalVisibilityChanged(_) => "launcher-visible",
            BridgeEvent::GlobalModeChanged(_) => "wm",
            BridgeEvent::ActiveWindowChanged(_) => "active",
            BridgeEvent::LegacyResolved(..) => "legacy",
            BridgeEvent::LauncherItemChanged { .. } => "launcher-item",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Something was reported to the dock.
    Emitted,
    /// Bridge state changed without anything to report.
    Recorded,
    Unchanged,
    /// The notification referred to a window that is not live.
    Dropped,
}

#[derive(Debug, Default)]
pub struct NotificationRouter {
    pub(crate) identities: IdentityMap,
    pub(crate) tracker: ActiveWindowTracker,
    pub(crate) subscriptions: SubscriptionManager,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identities(&self) -> &IdentityMap {
        &self.identities
    }

    pub fn tracker(&self) -> &ActiveWindowTracker {
        &self.tracker
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn handle(&mut self, ctx: &mut BridgeContext, event: BridgeEvent) -> Result<Outcome> {
        match event {
            BridgeEvent::LifecycleCreated(object) => self.window_created(ctx, object),
            BridgeEvent::LifecycleRemoved(object) => Ok(self.window_removed(ctx, &object)),
            BridgeEvent::PropertyChanged(object, value) => {
                Ok(self.property_changed(ctx, &object, value))
            }
            BridgeEvent::GlobalVisibilityChanged(visible) => {
                ctx.dock
                    .on_visibility_hint(VisibilityHint::LauncherVisible(visible));
                ctx.dock.on_visibility_hint(VisibilityHint::Refresh);
                Ok(Outcome::Emitted)
            }
            BridgeEvent::GlobalModeChanged(name) => {
                ctx.dock.on_global_mode_changed(&name);
                Ok(Outcome::Emitted)
            }
            BridgeEvent::ActiveWindowChanged(target) => {
                Ok(self
                    .tracker
                    .on_activation(ctx, &mut self.identities, target))
            }
            BridgeEvent::LegacyResolved(object, legacy) => {
                match self.identities.bind_legacy(&object, legacy)? {
                    LegacyBinding::Bound => {
                        tracing::debug!(object = %object, %legacy, "legacy id resolved");
                        Ok(Outcome::Recorded)
                    }
                    LegacyBinding::AlreadyBound => Ok(Outcome::Unchanged),
                    LegacyBinding::UnknownRecord => {
                        tracing::debug!(object = %object, %legacy, "legacy id for unknown window");
                        Ok(Outcome::Dropped)
                    }
                }
            }
            BridgeEvent::LauncherItemChanged { status, path } => {
                Ok(launcher_item_changed(ctx, status, &path))
            }
        }
    }

    fn window_created(&mut self, ctx: &mut BridgeContext, object: ObjectRef) -> Result<Outcome> {
        if let Some(record) = self.identities.resolve(&object) {
            if record.subscription().is_some() {
                tracing::debug!(object = %object, "duplicate window creation");
                return Ok(Outcome::Unchanged);
            }

            // An earlier attach failed; a resent creation is the retry.
            let subscription = self.subscriptions.attach(ctx.source.as_mut(), record)?;
            if let Some(record) = self.identities.resolve_mut(&object) {
                record.subscription = Some(subscription);
            }
            tracing::info!(object = %object, "window subscription restored");
            return Ok(Outcome::Recorded);
        }

        let handle = ctx.registry.register_window(&object);
        let record = self
            .identities
            .insert(WindowRecord::new(object.clone(), handle))?;

        let attached = self.subscriptions.attach(ctx.source.as_mut(), record);
        if let Ok(subscription) = attached {
            record.subscription = Some(subscription);
        }

        tracing::debug!(object = %object, %handle, "window discovered");
        ctx.dock.on_window_discovered(handle);

        attached.map(|_| Outcome::Emitted)
    }

    fn window_removed(&mut self, ctx: &mut BridgeContext, object: &ObjectRef) -> Outcome {
        let Some(record) = self.identities.remove(object) else {
            tracing::debug!(object = %object, "removal for unknown window");
            return Outcome::Dropped;
        };

        if let Some(subscription) = record.subscription() {
            self.subscriptions.detach(ctx.source.as_mut(), subscription);
        }
        if self.tracker.forget(object) {
            tracing::debug!(object = %object, "active window removed");
        }

        let handle = record.handle();
        ctx.registry.unregister_window(handle);
        tracing::debug!(object = %object, %handle, "window removed");
        ctx.dock.on_window_removed(handle);
        Outcome::Emitted
    }

    fn property_changed(
        &mut self,
        ctx: &mut BridgeContext,
        object: &ObjectRef,
        value: PropertyValue,
    ) -> Outcome {
        let Some(record) = self.identities.resolve_mut(object) else {
            tracing::trace!(object = %object, field = %value.field(), "property change for unknown window");
            return Outcome::Dropped;
        };

        match record.apply(value) {
            Change::Changed(field) => {
                tracing::trace!(object = %object, %field, version = record.version(), "window property changed");
                ctx.dock.on_property_changed(record.handle(), field);
                Outcome::Emitted
            }
            Change::Unchanged => Outcome::Unchanged,
        }
    }

    pub(crate) fn clear(&mut self, ctx: &mut BridgeContext) {
        self.subscriptions.detach_all(ctx.source.as_mut());
        for record in self.identities.drain() {
            ctx.registry.unregister_window(record.handle());
        }
        self.tracker = ActiveWindowTracker::new();
    }
}

fn launcher_item_changed(ctx: &mut BridgeContext, status: LauncherItemStatus, path: &str) -> Outcome {
    tracing::info!(?status, path, "launcher item changed");
    match status {
        LauncherItemStatus::Deleted => {
            ctx.dock.on_launcher_item_deleted(path);
            Outcome::Emitted
        }
        LauncherItemStatus::Updated => {
            ctx.dock.on_launcher_item_updated(path);
            Outcome::Emitted
        }
        // Reinstalled apps are not put back on the dock.
        LauncherItemStatus::Created => Outcome::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BridgeError,
        dock::{DockEvent, RecordingDock},
        registry::SequentialRegistry,
        source::MemorySource,
        window::{Rect, WindowField},
    };

    struct Harness {
        ctx: BridgeContext,
        dock: RecordingDock,
        source: MemorySource,
        router: NotificationRouter,
    }

    impl Harness {
        fn new() -> Self {
            let dock = RecordingDock::new();
            let source = MemorySource::new();
            let ctx = BridgeContext::new(source.clone(), SequentialRegistry::new(), dock.clone());
            Self {
                ctx,
                dock,
                source,
                router: NotificationRouter::new(),
            }
        }

        fn handle(&mut self, event: BridgeEvent) -> Result<Outcome> {
            self.router.handle(&mut self.ctx, event)
        }
    }

    fn obj(path: &str) -> ObjectRef {
        ObjectRef::from(path)
    }

    fn handle(raw: u32) -> WindowHandle {
        WindowHandle::new(raw).unwrap()
    }

    #[test]
    fn test_created_then_title_change() {
        let mut h = Harness::new();

        assert_eq!(
            h.handle(BridgeEvent::LifecycleCreated(obj("/w/1"))).unwrap(),
            Outcome::Emitted
        );
        assert_eq!(
            h.handle(BridgeEvent::PropertyChanged(
                obj("/w/1"),
                PropertyValue::Title("Firefox".to_owned())
            ))
            .unwrap(),
            Outcome::Emitted
        );

        assert_eq!(
            h.dock.take(),
            vec![
                DockEvent::WindowDiscovered(handle(1)),
                DockEvent::PropertyChanged(handle(1), WindowField::Title),
            ]
        );
        let record = h.router.identities().resolve(&obj("/w/1")).unwrap();
        assert_eq!(record.version(), 2);
        assert_eq!(record.title(), "Firefox");
        assert!(h.source.is_subscribed(&obj("/w/1")));
    }

    #[test]
    fn test_duplicate_creation_is_unchanged() {
        let mut h = Harness::new();
        h.handle(BridgeEvent::LifecycleCreated(obj("/w/1"))).unwrap();
        h.dock.take();

        assert_eq!(
            h.handle(BridgeEvent::LifecycleCreated(obj("/w/1"))).unwrap(),
            Outcome::Unchanged
        );
        assert!(h.dock.events().is_empty());
        assert_eq!(h.router.identities().len(), 1);
        assert_eq!(h.router.subscriptions().len(), 1);
    }

    #[test]
    fn test_attach_failure_keeps_degraded_record_until_resend() {
        let mut h = Harness::new();
        h.source.reject(&obj("/w/1"));

        let err = h
            .handle(BridgeEvent::LifecycleCreated(obj("/w/1")))
            .unwrap_err();
        assert!(matches!(err, BridgeError::AttachFailed { .. }));
        assert_eq!(h.dock.take(), vec![DockEvent::WindowDiscovered(handle(1))]);

        let record = h.router.identities().resolve(&obj("/w/1")).unwrap();
        assert!(record.subscription().is_none());

        h.source.accept(&obj("/w/1"));
        assert_eq!(
            h.handle(BridgeEvent::LifecycleCreated(obj("/w/1"))).unwrap(),
            Outcome::Recorded
        );
        let record = h.router.identities().resolve(&obj("/w/1")).unwrap();
        assert!(record.subscription().is_some());
        assert!(h.dock.events().is_empty());
    }

    #[test]
    fn test_removal_releases_everything() {
        let mut h = Harness::new();
        h.handle(BridgeEvent::LifecycleCreated(obj("/w/1"))).unwrap();
        h.handle(BridgeEvent::LegacyResolved(obj("/w/1"), LegacyId::new(7).unwrap()))
            .unwrap();
        h.handle(BridgeEvent::ActiveWindowChanged(Some(handle(1))))
            .unwrap();
        h.dock.take();

        assert_eq!(
            h.handle(BridgeEvent::LifecycleRemoved(obj("/w/1"))).unwrap(),
            Outcome::Emitted
        );
        assert_eq!(h.dock.take(), vec![DockEvent::WindowRemoved(handle(1))]);
        assert!(h.router.identities().is_empty());
        assert!(h.router.subscriptions().is_empty());
        assert!(h.router.tracker().active().is_none());
        assert!(!h.source.is_subscribed(&obj("/w/1")));

        assert_eq!(
            h.handle(BridgeEvent::LifecycleRemoved(obj("/w/1"))).unwrap(),
            Outcome::Dropped
        );
    }

    #[test]
    fn test_property_for_unknown_window_is_dropped() {
        let mut h = Harness::new();
        assert_eq!(
            h.handle(BridgeEvent::PropertyChanged(
                obj("/w/404"),
                PropertyValue::Geometry(Rect::new(0, 0, 10, 10))
            ))
            .unwrap(),
            Outcome::Dropped
        );
        assert!(h.dock.events().is_empty());
        assert!(h.router.identities().is_empty());
    }

    #[test]
    fn test_equal_property_does_not_emit() {
        let mut h = Harness::new();
        h.handle(BridgeEvent::LifecycleCreated(obj("/w/1"))).unwrap();
        h.handle(BridgeEvent::PropertyChanged(
            obj("/w/1"),
            PropertyValue::Attention(true),
        ))
        .unwrap();
        h.dock.take();

        assert_eq!(
            h.handle(BridgeEvent::PropertyChanged(
                obj("/w/1"),
                PropertyValue::Attention(true)
            ))
            .unwrap(),
            Outcome::Unchanged
        );
        assert!(h.dock.events().is_empty());
        assert_eq!(
            h.router.identities().resolve(&obj("/w/1")).unwrap().version(),
            2
        );
    }

    #[test]
    fn test_legacy_conflict_is_surfaced() {
        let mut h = Harness::new();
        h.handle(BridgeEvent::LifecycleCreated(obj("/w/1"))).unwrap();
        h.handle(BridgeEvent::LifecycleCreated(obj("/w/2"))).unwrap();
        let legacy = LegacyId::new(0x400001).unwrap();

        assert_eq!(
            h.handle(BridgeEvent::LegacyResolved(obj("/w/1"), legacy))
                .unwrap(),
            Outcome::Recorded
        );
        assert_eq!(
            h.handle(BridgeEvent::LegacyResolved(obj("/w/1"), legacy))
                .unwrap(),
            Outcome::Unchanged
        );
        let err = h
            .handle(BridgeEvent::LegacyResolved(obj("/w/2"), legacy))
            .unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_global_pass_through() {
        let mut h = Harness::new();
        h.handle(BridgeEvent::GlobalVisibilityChanged(true)).unwrap();
        h.handle(BridgeEvent::GlobalModeChanged("deepin-wm".to_owned()))
            .unwrap();

        assert_eq!(
            h.dock.take(),
            vec![
                DockEvent::VisibilityHint(VisibilityHint::LauncherVisible(true)),
                DockEvent::VisibilityHint(VisibilityHint::Refresh),
                DockEvent::GlobalModeChanged("deepin-wm".to_owned()),
            ]
        );
        assert!(h.router.identities().is_empty());
    }

    #[test]
    fn test_launcher_items() {
        let mut h = Harness::new();
        let path = "/usr/share/applications/firefox.desktop";

        for status in [
            LauncherItemStatus::Created,
            LauncherItemStatus::Updated,
            LauncherItemStatus::Deleted,
        ] {
            h.handle(BridgeEvent::LauncherItemChanged {
                status,
                path: path.to_owned(),
            })
            .unwrap();
        }

        assert_eq!(
            h.dock.take(),
            vec![
                DockEvent::LauncherItemUpdated(path.to_owned()),
                DockEvent::LauncherItemDeleted(path.to_owned()),
            ]
        );
    }
}
