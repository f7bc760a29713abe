use crate::{dock::Dock, registry::WindowRegistry, source::NotificationSource};

/// Every external handle the bridge talks to, built once at startup and
/// passed by reference to the components that need it.
pub struct BridgeContext {
    pub source: Box<dyn NotificationSource>,
    pub registry: Box<dyn WindowRegistry>,
    pub dock: Box<dyn Dock>,
}

impl BridgeContext {
    pub fn new(
        source: impl NotificationSource + 'static,
        registry: impl WindowRegistry + 'static,
        dock: impl Dock + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            registry: Box::new(registry),
            dock: Box::new(dock),
        }
    }
}
