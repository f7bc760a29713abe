//! calloop wiring for the daemon.
//!
//! Every notification source gets its own channel, so notifications from one
//! source are handled in the order it sent them while different sources
//! interleave freely.

use calloop::{
    LoopHandle, LoopSignal,
    channel::{self, Sender},
    signals::{Signal, Signals},
};

use crate::{BridgeError, Result, daemon::Daemon, router::BridgeEvent};

pub fn insert_notification_channel(
    loop_handle: &LoopHandle<'static, Daemon>,
    name: &str,
) -> Result<Sender<BridgeEvent>> {
    let (sender, receiver) = channel::channel::<BridgeEvent>();
    let source_name = name.to_owned();

    loop_handle
        .insert_source(receiver, move |event, _, daemon| match event {
            channel::Event::Msg(event) => daemon.bridge.dispatch(event),
            channel::Event::Closed => {
                tracing::info!(source = %source_name, "notification source closed");
            }
        })
        .map_err(|err| {
            BridgeError::EventLoop(format!("failed to register notification source {name}: {err}"))
        })?;

    tracing::debug!(source = name, "notification source registered");
    Ok(sender)
}

/// SIGINT and SIGTERM shut the bridge down and stop the loop.
pub fn insert_shutdown_signals(
    loop_handle: &LoopHandle<'static, Daemon>,
    loop_signal: LoopSignal,
) -> Result<()> {
    let signals = Signals::new(&[Signal::SIGINT, Signal::SIGTERM]).map_err(|err| {
        BridgeError::EventLoop(format!("failed to install signal handlers: {err}"))
    })?;

    loop_handle
        .insert_source(signals, move |event, _, daemon| {
            tracing::info!(signal = ?event.signal(), "shutting down");
            daemon.shutdown();
            loop_signal.stop();
        })
        .map_err(|err| BridgeError::EventLoop(format!("failed to register signals: {err}")))?;

    Ok(())
}
