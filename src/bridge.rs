use std::{
    fmt::Write as _,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    Result,
    context::BridgeContext,
    router::{BridgeEvent, NotificationRouter, Outcome},
    source::SourceSet,
    window::{WindowFields, WindowHandle, WindowRecord},
};

pub struct Bridge {
    ctx: BridgeContext,
    router: NotificationRouter,
    wanted_sources: SourceSet,
    shut_down: bool,
}

impl Bridge {
    pub fn new(ctx: BridgeContext, wanted_sources: SourceSet) -> Self {
        Self {
            ctx,
            router: NotificationRouter::new(),
            wanted_sources,
            shut_down: false,
        }
    }

    /// Attaches the global subscriptions and forwards the window manager
    /// the source reports at startup.
    pub fn start(&mut self) -> SourceSet {
        let attached = self
            .router
            .subscriptions
            .attach_globals(self.ctx.source.as_mut(), self.wanted_sources);

        if let Some(wm) = self.ctx.source.current_wm() {
            tracing::info!(wm = %wm, "current window manager");
            self.ctx.dock.on_global_mode_changed(&wm);
        }

        attached
    }

    pub fn set_sources(&mut self, wanted: SourceSet) -> SourceSet {
        self.wanted_sources = wanted;
        if self.shut_down {
            return SourceSet::empty();
        }
        self.router
            .subscriptions
            .attach_globals(self.ctx.source.as_mut(), wanted)
    }

    pub fn handle(&mut self, event: BridgeEvent) -> Result<Outcome> {
        if self.shut_down {
            tracing::trace!(kind = event.kind(), "bridge is shut down; dropping notification");
            return Ok(Outcome::Dropped);
        }
        self.router.handle(&mut self.ctx, event)
    }

    /// Like [`Bridge::handle`], but every error is logged here and never
    /// reaches the caller.
    pub fn dispatch(&mut self, event: BridgeEvent) {
        let kind = event.kind();
        match self.handle(event) {
            Ok(outcome) => tracing::trace!(kind, ?outcome, "notification handled"),
            Err(err) if err.is_invariant_violation() => {
                tracing::error!(kind, "notification rejected: {err}");
            }
            Err(err) => tracing::warn!(kind, "notification partially applied: {err}"),
        }
    }

    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.router.clear(&mut self.ctx);
        self.shut_down = true;
        tracing::info!("bridge shut down; all subscriptions released");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn router(&self) -> &NotificationRouter {
        &self.router
    }

    pub fn record_count(&self) -> usize {
        self.router.identities.len()
    }

    pub fn active_window(&self) -> Option<&WindowRecord> {
        self.router
            .tracker
            .active()
            .and_then(|object| self.router.identities.resolve(object))
    }

    pub fn is_showing_desktop(&self) -> bool {
        self.ctx.source.is_showing_desktop()
    }

    /// Returns and clears the fields each window changed since the last call.
    pub fn drain_dirty(&mut self) -> Vec<(WindowHandle, WindowFields)> {
        let objects: Vec<_> = self
            .router
            .identities
            .iter()
            .filter(|record| !record.dirty().is_empty())
            .map(|record| record.object().clone())
            .collect();

        let mut drained = Vec::with_capacity(objects.len());
        for object in &objects {
            if let Some(record) = self.router.identities.resolve_mut(object) {
                drained.push((record.handle(), record.take_dirty()));
            }
        }
        drained.sort_by_key(|(handle, _)| *handle);
        drained
    }

    pub fn render_report(&self) -> String {
        let mut records: Vec<&WindowRecord> = self.router.identities.iter().collect();
        records.sort_by_key(|record| record.handle());

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Sources: {}",
            render_sources(self.router.subscriptions.globals())
        );
        let _ = writeln!(out, "Showing desktop: {}", self.is_showing_desktop());
        let _ = writeln!(out);

        if records.is_empty() {
            out.push_str("No windows.\n");
            return out;
        }

        for record in records {
            let legacy = record
                .legacy()
                .map(|legacy| legacy.to_string())
                .unwrap_or_else(|| "<unresolved>".to_owned());
            let title = if record.title().is_empty() {
                "<untitled>"
            } else {
                record.title()
            };
            let subscription = record
                .subscription()
                .map(|handle| handle.to_string())
                .unwrap_or_else(|| "<detached>".to_owned());

            let _ = writeln!(out, "Window {}:", record.handle());
            let _ = writeln!(out, "  object: {}", record.object());
            let _ = writeln!(out, "  legacy: {legacy}");
            let _ = writeln!(out, "  title: {title}");
            if !record.icon().is_empty() {
                let _ = writeln!(out, "  icon: {}", record.icon());
            }
            let _ = writeln!(out, "  geometry: {}", record.geometry());
            let _ = writeln!(out, "  attention: {}", record.attention());
            let _ = writeln!(out, "  active: {}", record.is_active());
            let _ = writeln!(out, "  version: {}", record.version());
            let _ = writeln!(out, "  subscription: {subscription}");
            out.push('\n');
        }

        out
    }
}

fn render_sources(sources: SourceSet) -> String {
    if sources.is_empty() {
        return "none".to_owned();
    }
    crate::source::GlobalTopic::ALL
        .iter()
        .filter(|topic| sources.contains(topic.flag()))
        .map(|topic| topic.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Bridge shared between producer threads. Each notification is handled
/// end to end under one lock.
#[derive(Clone)]
pub struct SharedBridge(Arc<Mutex<Bridge>>);

impl SharedBridge {
    pub fn new(bridge: Bridge) -> Self {
        Self(Arc::new(Mutex::new(bridge)))
    }

    fn lock(&self) -> MutexGuard<'_, Bridge> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn dispatch(&self, event: BridgeEvent) {
        self.lock().dispatch(event);
    }

    pub fn handle(&self, event: BridgeEvent) -> Result<Outcome> {
        self.lock().handle(event)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Bridge) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn shutdown(&self) {
        self.lock().shutdown();
    }
}
