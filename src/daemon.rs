use std::{fmt::Write as _, path::PathBuf};

use crate::{
    Result,
    bridge::Bridge,
    config,
    ipc::{self, ControlCommand, StateUpdate},
    source::MemorySource,
};

/// Event loop state of the `dock-bridge` daemon.
pub struct Daemon {
    pub bridge: Bridge,
    /// Same source the bridge subscribes through; control lines update the
    /// values it answers queries with.
    pub source: MemorySource,
    pub config_path: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
    pub wayland_session: bool,
}

impl Daemon {
    pub fn new(bridge: Bridge, source: MemorySource, wayland_session: bool) -> Self {
        Self {
            bridge,
            source,
            config_path: None,
            socket_path: None,
            wayland_session,
        }
    }

    /// Runs one command and returns what the client should see, if anything.
    pub fn execute(&mut self, command: ControlCommand) -> Result<Option<String>> {
        match command {
            ControlCommand::Notify(event) => {
                self.bridge.handle(event)?;
                Ok(None)
            }
            ControlCommand::State(update) => {
                self.apply_state(update);
                Ok(None)
            }
            ControlCommand::Clients => Ok(Some(self.bridge.render_report())),
            ControlCommand::Reload => {
                self.reload_config()?;
                Ok(None)
            }
        }
    }

    fn apply_state(&self, update: StateUpdate) {
        tracing::debug!(?update, "source state updated");
        match update {
            StateUpdate::ShowingDesktop(showing) => self.source.set_showing_desktop(showing),
            StateUpdate::ActiveWindow(raw) => self.source.set_active_window(raw),
            StateUpdate::CurrentWm(name) => self.source.set_current_wm(name),
        }
    }

    pub fn reload_config(&mut self) -> Result<()> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => config::config_path()?,
        };
        let config = config::load_from_path(&path)?;
        let wanted = config.wanted_sources(self.wayland_session);
        let attached = self.bridge.set_sources(wanted);
        if attached != wanted {
            tracing::warn!(?wanted, ?attached, "some sources could not be attached");
        }
        if config.socket.is_some() && config.socket != self.socket_path {
            tracing::warn!("control socket path changes apply on restart");
        }
        tracing::info!(path = %path.display(), "reloaded config");
        Ok(())
    }

    /// Handles a whole request, one command per line. Commands run in order;
    /// a failing line is reported and the rest still run.
    pub fn handle_control_request(&mut self, request: &str) -> String {
        let mut response = String::new();
        let mut failed = false;

        for line in request.lines().filter(|line| !line.trim().is_empty()) {
            match ipc::parse_line(line).and_then(|command| self.execute(command)) {
                Ok(Some(output)) => response.push_str(&output),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!("control command failed: {err}");
                    let _ = writeln!(response, "error: {err}");
                    failed = true;
                }
            }
        }

        if response.is_empty() && !failed {
            if request.trim().is_empty() {
                return "error: empty request (supported: clients, reload, state, notifications)\n"
                    .to_owned();
            }
            response.push_str("ok\n");
        }
        response
    }

    pub fn shutdown(&mut self) {
        self.bridge.shutdown();
        if let Some(path) = self.socket_path.take()
            && let Err(err) = std::fs::remove_file(&path)
        {
            tracing::debug!(path = %path.display(), "failed to remove control socket: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::BridgeContext,
        dock::{DockEvent, RecordingDock, VisibilityHint},
        registry::SequentialRegistry,
        source::SourceSet,
        window::WindowHandle,
    };

    fn daemon() -> (Daemon, RecordingDock) {
        let dock = RecordingDock::new();
        let source = MemorySource::new();
        let ctx = BridgeContext::new(source.clone(), SequentialRegistry::new(), dock.clone());
        let bridge = Bridge::new(ctx, SourceSet::all());
        (Daemon::new(bridge, source, false), dock)
    }

    #[test]
    fn test_request_runs_every_line() {
        let (mut daemon, dock) = daemon();
        let response = daemon.handle_control_request(
            "created /w/1\ntitle /w/1 Terminal\nlegacy /w/1 0x200\nactive 1\n",
        );
        assert_eq!(response, "ok\n");

        let handle = WindowHandle::new(1).unwrap();
        assert_eq!(dock.events().len(), 3);
        assert_eq!(
            dock.events().last(),
            Some(&DockEvent::ActiveWindowChanged(handle))
        );
    }

    #[test]
    fn test_request_reports_failures_and_continues() {
        let (mut daemon, dock) = daemon();
        let response = daemon.handle_control_request("bogus\nlauncher-visible true\n");
        assert!(response.starts_with("error: malformed control line `bogus`"));
        assert_eq!(
            dock.take(),
            vec![
                DockEvent::VisibilityHint(VisibilityHint::LauncherVisible(true)),
                DockEvent::VisibilityHint(VisibilityHint::Refresh),
            ]
        );
    }

    #[test]
    fn test_state_lines_feed_source_queries() {
        let (mut daemon, _) = daemon();
        daemon.handle_control_request("state showing-desktop true\nstate active 4\n");
        assert!(daemon.bridge.is_showing_desktop());
        assert!(daemon.handle_control_request("clients").contains("Showing desktop: true"));
    }

    #[test]
    fn test_empty_request_is_an_error() {
        let (mut daemon, _) = daemon();
        assert!(daemon.handle_control_request("\n \n").starts_with("error: empty request"));
    }

    #[test]
    fn test_reload_without_config_file_fails() {
        let (mut daemon, _) = daemon();
        daemon.config_path = Some(PathBuf::from("/nonexistent/dock-bridge/config.lua"));
        let response = daemon.handle_control_request("reload");
        assert!(response.starts_with("error: config error: config file not found"));
    }
}
