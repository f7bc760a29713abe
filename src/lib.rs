pub mod active;
pub mod bridge;
pub mod config;
pub mod context;
pub mod daemon;
pub mod dock;
pub mod errors;
pub mod event_loop;
pub mod identity;
pub mod ipc;
pub mod registry;
pub mod router;
pub mod source;
pub mod subscription;
pub mod window;

pub use bridge::{Bridge, SharedBridge};
pub use context::BridgeContext;
pub use errors::{BridgeError, Result};
pub use router::{BridgeEvent, Outcome};
