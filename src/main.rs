use std::{
    backtrace::Backtrace,
    fs,
    io::{BufRead, Read, Write},
    os::unix::net::UnixStream,
    path::PathBuf,
    thread,
};

use anyhow::{Context, bail};
use calloop::{EventLoop, channel::Sender};
use dock_bridge::{
    Bridge, BridgeContext, BridgeError, BridgeEvent, config, daemon::Daemon, dock::LogDock,
    event_loop, ipc, registry::SequentialRegistry, source::MemorySource,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: dock-bridge [--stdin] | clients | reload | send <line>";

fn main() -> anyhow::Result<()> {
    init_backtrace_defaults();
    init_logging()?;
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!("panic: {panic_info}\n{backtrace}");
        eprintln!("panic: {panic_info}\n{backtrace}");
    }));

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some(command @ ("clients" | "reload")) => {
            print!("{}", run_ipc_command(command)?);
            return Ok(());
        }
        Some("send") => {
            let line = args[2..].join(" ");
            if line.trim().is_empty() {
                bail!("{USAGE}");
            }
            print!("{}", run_ipc_command(&line)?);
            return Ok(());
        }
        Some("--help" | "-h") => {
            println!("{USAGE}");
            return Ok(());
        }
        _ => {}
    }
    let read_stdin = args.iter().skip(1).any(|arg| arg == "--stdin");

    let loaded = config::load_or_create_default().context("failed to load config.lua")?;
    let wayland_session = is_wayland_session();
    let wanted = loaded.config.wanted_sources(wayland_session);

    let mut event_loop: EventLoop<Daemon> =
        EventLoop::try_new().map_err(|e| BridgeError::EventLoop(e.to_string()))?;

    let source = MemorySource::new();
    let ctx = BridgeContext::new(source.clone(), SequentialRegistry::new(), LogDock);
    let mut daemon = Daemon::new(Bridge::new(ctx, wanted), source, wayland_session);
    daemon.config_path = Some(loaded.path);

    let attached = daemon.bridge.start();
    tracing::info!(?wanted, ?attached, wayland_session, "bridge started");

    let loop_handle = event_loop.handle();
    let socket = ipc::control_socket_path(loaded.config.socket.as_deref()).and_then(|path| {
        ipc::init_control_listener(&loop_handle, &path)?;
        Ok(path)
    });
    match socket {
        Ok(path) => {
            tracing::info!(path = %path.display(), "control socket initialized");
            daemon.socket_path = Some(path);
        }
        Err(err) => tracing::warn!("failed to initialize control socket: {err}"),
    }

    // Signals are masked on this thread; spawn readers only after this.
    event_loop::insert_shutdown_signals(&loop_handle, event_loop.get_signal())?;

    if read_stdin {
        let sender = event_loop::insert_notification_channel(&loop_handle, "stdin")?;
        spawn_stdin_feed(sender)?;
    }

    event_loop
        .run(None, &mut daemon, |_| {})
        .map_err(|e| BridgeError::EventLoop(e.to_string()))?;

    daemon.shutdown();
    Ok(())
}

/// Feeds notification lines from stdin, one per line, into the loop.
fn spawn_stdin_feed(sender: Sender<BridgeEvent>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("stdin-feed".to_owned())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        tracing::warn!("failed to read stdin: {err}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match ipc::parse_event(&line) {
                    Ok(event) => {
                        if sender.send(event).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!("ignoring stdin line: {err}"),
                }
            }
        })
        .context("failed to spawn stdin reader")?;
    Ok(())
}

fn run_ipc_command(request: &str) -> anyhow::Result<String> {
    let socket_path = client_socket_path()?;
    let mut stream = UnixStream::connect(&socket_path).with_context(|| {
        format!(
            "failed to connect to dock-bridge control socket {}",
            socket_path.display()
        )
    })?;

    stream
        .write_all(request.as_bytes())
        .context("failed to send control command")?;
    stream
        .shutdown(std::net::Shutdown::Write)
        .context("failed to finalize control command write")?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .context("failed to read control response")?;

    if response.is_empty() {
        bail!("empty response from dock-bridge");
    }
    if response.starts_with("error:") {
        bail!("{}", response.trim_end());
    }

    Ok(response)
}

fn client_socket_path() -> anyhow::Result<PathBuf> {
    if let Some(path) = std::env::var_os("DOCK_BRIDGE_SOCKET")
        && !path.is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    let configured = config::config_path()
        .ok()
        .filter(|path| path.exists())
        .and_then(|path| config::load_from_path(&path).ok())
        .and_then(|config| config.socket);
    Ok(ipc::control_socket_path(configured.as_deref())?)
}

fn init_backtrace_defaults() {
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    if std::env::var_os("RUST_LIB_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_LIB_BACKTRACE", "0") };
    }
}

fn is_wayland_session() -> bool {
    std::env::var_os("WAYLAND_DISPLAY").is_some_and(|display| !display.is_empty())
}

const DEFAULT_LOG_FILTER: &str = "dock_bridge=debug";

fn log_dir() -> PathBuf {
    if let Some(state) = std::env::var_os("XDG_STATE_HOME")
        && !state.is_empty()
    {
        return PathBuf::from(state).join("dock-bridge");
    }
    if let Some(home) = std::env::var_os("HOME")
        && !home.is_empty()
    {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("dock-bridge");
    }
    std::env::temp_dir().join("dock-bridge")
}

fn init_logging() -> anyhow::Result<()> {
    let log_dir = log_dir();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "dock-bridge.log");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender),
        )
        .init();

    let log_file = log_dir.join("dock-bridge.log");
    tracing::debug!(path = %log_file.display(), "logging initialized");

    Ok(())
}
