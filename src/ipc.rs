//! Control socket and its line protocol.
//!
//! A client writes one or more commands, one per line, shuts down its write
//! half and reads the response until EOF. Each client is read without
//! blocking as its own loop source, so an idle client never stalls the loop.

use std::{
    io::{ErrorKind, Read, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
};

use calloop::{Interest, LoopHandle, Mode, PostAction, generic::Generic};

use crate::{
    BridgeError, Result,
    daemon::Daemon,
    dock::LauncherItemStatus,
    router::BridgeEvent,
    window::{LegacyId, ObjectRef, PropertyValue, Rect, WindowHandle},
};

pub const SOCKET_NAME: &str = "dock-bridge.sock";

const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Notify(BridgeEvent),
    /// Updates a value the source answers synchronous queries with.
    State(StateUpdate),
    Clients,
    Reload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateUpdate {
    ShowingDesktop(bool),
    ActiveWindow(u32),
    CurrentWm(String),
}

pub fn parse_line(line: &str) -> Result<ControlCommand> {
    let trimmed = line.trim();
    let (command, rest) = split_word(trimmed);
    match command {
        "" => Err(BridgeError::protocol(line, "empty command")),
        "clients" => no_arguments(line, rest).map(|()| ControlCommand::Clients),
        "reload" => no_arguments(line, rest).map(|()| ControlCommand::Reload),
        "state" => parse_state(line, rest).map(ControlCommand::State),
        _ => parse_event(line).map(ControlCommand::Notify),
    }
}

/// Parses a notification line. Control-only commands are rejected here.
pub fn parse_event(line: &str) -> Result<BridgeEvent> {
    let trimmed = line.trim();
    let (command, rest) = split_word(trimmed);

    let event = match command {
        "created" => BridgeEvent::LifecycleCreated(single_object(line, rest)?),
        "removed" => BridgeEvent::LifecycleRemoved(single_object(line, rest)?),
        "title" => {
            let (object, text) = object_and_rest(line, rest)?;
            BridgeEvent::PropertyChanged(object, PropertyValue::Title(text.to_owned()))
        }
        "icon" => {
            let (object, text) = object_and_rest(line, rest)?;
            BridgeEvent::PropertyChanged(object, PropertyValue::Icon(text.to_owned()))
        }
        "attention" => {
            let (object, raw) = object_and_rest(line, rest)?;
            BridgeEvent::PropertyChanged(object, PropertyValue::Attention(parse_bool(line, raw)?))
        }
        "geometry" => {
            let (object, raw) = object_and_rest(line, rest)?;
            BridgeEvent::PropertyChanged(object, PropertyValue::Geometry(parse_rect(line, raw)?))
        }
        "legacy" => {
            let (object, raw) = object_and_rest(line, rest)?;
            let legacy = LegacyId::new(parse_u32(line, raw)?)
                .ok_or_else(|| BridgeError::protocol(line, "legacy id must be non-zero"))?;
            BridgeEvent::LegacyResolved(object, legacy)
        }
        "active" => {
            if rest.is_empty() {
                BridgeEvent::ActiveWindowChanged(None)
            } else {
                let handle = WindowHandle::new(parse_u32(line, rest)?)
                    .ok_or_else(|| BridgeError::protocol(line, "window handle must be non-zero"))?;
                BridgeEvent::ActiveWindowChanged(Some(handle))
            }
        }
        "launcher-visible" => BridgeEvent::GlobalVisibilityChanged(parse_bool(line, rest)?),
        "wm" => {
            if rest.is_empty() {
                return Err(BridgeError::protocol(line, "missing window manager name"));
            }
            BridgeEvent::GlobalModeChanged(rest.to_owned())
        }
        "launcher-item" => {
            let (raw_status, path) = split_word(rest);
            let status = LauncherItemStatus::parse(raw_status).ok_or_else(|| {
                BridgeError::protocol(line, format!("unknown launcher item status `{raw_status}`"))
            })?;
            if path.is_empty() {
                return Err(BridgeError::protocol(line, "missing launcher item path"));
            }
            BridgeEvent::LauncherItemChanged {
                status,
                path: path.to_owned(),
            }
        }
        "" => return Err(BridgeError::protocol(line, "empty command")),
        other => {
            return Err(BridgeError::protocol(
                line,
                format!("unknown command `{other}`"),
            ));
        }
    };

    Ok(event)
}

fn parse_state(line: &str, rest: &str) -> Result<StateUpdate> {
    let (key, value) = split_word(rest);
    match key {
        "showing-desktop" => parse_bool(line, value).map(StateUpdate::ShowingDesktop),
        "active" => parse_u32(line, value).map(StateUpdate::ActiveWindow),
        "wm" if !value.is_empty() => Ok(StateUpdate::CurrentWm(value.to_owned())),
        "wm" => Err(BridgeError::protocol(line, "missing window manager name")),
        other => Err(BridgeError::protocol(
            line,
            format!("unknown state key `{other}`"),
        )),
    }
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}

fn no_arguments(line: &str, rest: &str) -> Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(BridgeError::protocol(line, "command takes no arguments"))
    }
}

fn single_object(line: &str, rest: &str) -> Result<ObjectRef> {
    let (object, extra) = object_and_rest(line, rest)?;
    if !extra.is_empty() {
        return Err(BridgeError::protocol(line, "unexpected trailing arguments"));
    }
    Ok(object)
}

fn object_and_rest<'a>(line: &str, rest: &'a str) -> Result<(ObjectRef, &'a str)> {
    let (object, tail) = split_word(rest);
    if object.is_empty() {
        return Err(BridgeError::protocol(line, "missing object path"));
    }
    Ok((ObjectRef::from(object), tail))
}

fn parse_bool(line: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(BridgeError::protocol(
            line,
            format!("invalid bool `{raw}` (expected true/false or 0/1)"),
        )),
    }
}

fn parse_u32(line: &str, raw: &str) -> Result<u32> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse::<u32>(),
    };
    parsed.map_err(|err| BridgeError::protocol(line, format!("invalid number `{raw}` ({err})")))
}

fn parse_rect(line: &str, raw: &str) -> Result<Rect> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    let [x, y, width, height] = parts.as_slice() else {
        return Err(BridgeError::protocol(
            line,
            "geometry expects `<x> <y> <width> <height>`",
        ));
    };

    let coordinate = |value: &str| {
        value.parse::<i32>().map_err(|err| {
            BridgeError::protocol(line, format!("invalid coordinate `{value}` ({err})"))
        })
    };
    let extent = |value: &str| {
        value
            .parse::<u32>()
            .map_err(|err| BridgeError::protocol(line, format!("invalid size `{value}` ({err})")))
    };

    Ok(Rect::new(
        coordinate(*x)?,
        coordinate(*y)?,
        extent(*width)?,
        extent(*height)?,
    ))
}

/// `configured` wins; otherwise the socket lives in `$XDG_RUNTIME_DIR`.
pub fn control_socket_path(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .ok_or_else(|| {
            BridgeError::backend("XDG_RUNTIME_DIR is not set; cannot place control socket")
        })?;
    Ok(PathBuf::from(runtime_dir).join(SOCKET_NAME))
}

pub fn init_control_listener(
    loop_handle: &LoopHandle<'static, Daemon>,
    socket_path: &Path,
) -> Result<()> {
    if socket_path.exists()
        && let Err(err) = std::fs::remove_file(socket_path)
    {
        return Err(BridgeError::backend(format!(
            "failed to remove stale control socket {}: {err}",
            socket_path.display()
        )));
    }

    let listener = UnixListener::bind(socket_path).map_err(|err| {
        BridgeError::backend(format!(
            "failed to bind control socket {}: {err}",
            socket_path.display()
        ))
    })?;
    listener.set_nonblocking(true).map_err(|err| {
        BridgeError::backend(format!(
            "failed to set control socket nonblocking {}: {err}",
            socket_path.display()
        ))
    })?;

    let client_handle = loop_handle.clone();
    loop_handle
        .insert_source(
            Generic::new(listener, Interest::READ, Mode::Level),
            move |_, listener, _| {
                loop {
                    match listener.accept() {
                        Ok((stream, _)) => insert_control_client(&client_handle, stream),
                        Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                        Err(err) => {
                            tracing::warn!("control socket accept failed: {err}");
                            break;
                        }
                    }
                }
                Ok(PostAction::Continue)
            },
        )
        .map_err(|err| {
            BridgeError::EventLoop(format!("failed to init control listener: {err}"))
        })?;

    Ok(())
}

/// Buffers one client's request until EOF, then answers and drops the client.
fn insert_control_client(loop_handle: &LoopHandle<'static, Daemon>, stream: UnixStream) {
    if let Err(err) = stream.set_nonblocking(true) {
        tracing::warn!("failed to set control client nonblocking: {err}");
        return;
    }

    let mut request = Vec::new();
    let inserted = loop_handle.insert_source(
        Generic::new(stream, Interest::READ, Mode::Level),
        move |_, stream, daemon| {
            let mut reader: &UnixStream = stream;
            let mut chunk = [0u8; 4096];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => {
                        let response = match std::str::from_utf8(&request) {
                            Ok(request) => daemon.handle_control_request(request),
                            Err(err) => format!("error: request is not valid UTF-8: {err}\n"),
                        };
                        write_response(stream, &response);
                        return Ok(PostAction::Remove);
                    }
                    Ok(read) => {
                        request.extend_from_slice(&chunk[..read]);
                        if request.len() > MAX_REQUEST_BYTES {
                            tracing::warn!(bytes = request.len(), "control request too large");
                            write_response(stream, "error: request too large\n");
                            return Ok(PostAction::Remove);
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {
                        return Ok(PostAction::Continue);
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => {}
                    Err(err) => {
                        write_response(stream, &format!("error: failed to read request: {err}\n"));
                        return Ok(PostAction::Remove);
                    }
                }
            }
        },
    );
    if let Err(err) = inserted {
        tracing::warn!("failed to register control client: {err}");
    }
}

/// The client is still nonblocking; a response it does not drain is dropped.
fn write_response(mut stream: &UnixStream, message: &str) {
    if let Err(err) = stream.write_all(message.as_bytes()) {
        tracing::warn!("failed to write control response: {err}");
    }
}
