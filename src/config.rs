use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use crate::{BridgeError, source::SourceSet};

const KNOWN_KEYS: &[&str] = &[
    "sources.launcher",
    "sources.launcher_front",
    "sources.wm_switcher",
    "sources.compositor",
    "socket",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompositorMode {
    /// Follow the session type: enabled when `WAYLAND_DISPLAY` is set.
    Auto,
    Enabled,
    #[default]
    Disabled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub launcher: bool,
    pub launcher_front: bool,
    pub wm_switcher: bool,
    pub compositor: CompositorMode,
    /// Control socket path; `None` means `$XDG_RUNTIME_DIR/dock-bridge.sock`.
    pub socket: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            launcher: true,
            launcher_front: true,
            wm_switcher: true,
            compositor: CompositorMode::Disabled,
            socket: None,
        }
    }
}

impl BridgeConfig {
    pub fn wanted_sources(&self, wayland_session: bool) -> SourceSet {
        let mut sources = SourceSet::empty();
        sources.set(SourceSet::LAUNCHER_ITEMS, self.launcher);
        sources.set(SourceSet::LAUNCHER_VISIBILITY, self.launcher_front);
        sources.set(SourceSet::WM_SWITCHER, self.wm_switcher);
        let compositor = match self.compositor {
            CompositorMode::Auto => wayland_session,
            CompositorMode::Enabled => true,
            CompositorMode::Disabled => false,
        };
        sources.set(SourceSet::COMPOSITOR_WINDOWS, compositor);
        sources
    }

    pub fn from_values(values: &HashMap<String, String>) -> Result<Self, BridgeError> {
        let mut config = Self::default();

        for key in values.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::warn!(key, "ignoring unknown config key");
            }
        }

        config.launcher = parse_bool_flexible(values, "sources.launcher", config.launcher)?;
        config.launcher_front =
            parse_bool_flexible(values, "sources.launcher_front", config.launcher_front)?;
        config.wm_switcher =
            parse_bool_flexible(values, "sources.wm_switcher", config.wm_switcher)?;

        if let Some(raw) = values.get("sources.compositor") {
            config.compositor = if raw.trim().eq_ignore_ascii_case("auto") {
                CompositorMode::Auto
            } else if parse_bool_flexible(values, "sources.compositor", false)? {
                CompositorMode::Enabled
            } else {
                CompositorMode::Disabled
            };
        }

        config.socket = values
            .get("socket")
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        Ok(config)
    }
}

pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: BridgeConfig,
}

pub fn load_or_create_default() -> Result<LoadedConfig, BridgeError> {
    let path = config_path()?;
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                BridgeError::config(format!(
                    "failed to create config directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        fs::write(&path, default_config_template()).map_err(|err| {
            BridgeError::config(format!(
                "failed to write default config {}: {err}",
                path.display()
            ))
        })?;
        tracing::info!(path = %path.display(), "created default config.lua");
    }

    let config = load_from_path(&path)?;
    Ok(LoadedConfig { path, config })
}

pub fn load_from_path(path: &Path) -> Result<BridgeConfig, BridgeError> {
    if !path.exists() {
        return Err(BridgeError::config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path).map_err(|err| {
        BridgeError::config(format!("failed to read config {}: {err}", path.display()))
    })?;
    if content.trim().is_empty() {
        tracing::info!(path = %path.display(), "config.lua is empty; using defaults");
        return Ok(BridgeConfig::default());
    }

    let values = load_lua_values(path)?;
    BridgeConfig::from_values(&values)
}

pub fn config_path() -> Result<PathBuf, BridgeError> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Ok(PathBuf::from(xdg).join("dock-bridge").join("config.lua"));
    }

    if let Some(home) = std::env::var_os("HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home)
            .join(".config")
            .join("dock-bridge")
            .join("config.lua"));
    }

    Err(BridgeError::config(
        "unable to resolve config path: HOME and XDG_CONFIG_HOME are unset",
    ))
}

fn load_lua_values(path: &Path) -> Result<HashMap<String, String>, BridgeError> {
    let output = Command::new("lua")
        .arg("-e")
        .arg(lua_loader_script())
        .env("DOCK_BRIDGE_CONFIG_PATH", path)
        .output()
        .map_err(|err| BridgeError::config(format!("failed to execute lua: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        let reason = if stderr.is_empty() {
            "lua exited with non-zero status".to_owned()
        } else {
            stderr
        };
        return Err(BridgeError::config(format!(
            "failed to load {}: {reason}",
            path.display()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_key_value_stdout(&stdout)
}

fn parse_key_value_stdout(stdout: &str) -> Result<HashMap<String, String>, BridgeError> {
    let mut values = HashMap::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(BridgeError::config(format!(
                "invalid lua output line: {line}"
            )));
        };
        values.insert(key.to_owned(), value.to_owned());
    }
    Ok(values)
}

fn parse_bool_flexible(
    values: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, BridgeError> {
    let Some(raw) = values.get(key) else {
        return Ok(default);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(BridgeError::config(format!(
            "invalid value for {key}: {raw} (expected bool or 0/1)"
        ))),
    }
}

pub fn default_config_template() -> &'static str {
    r#"-- dock-bridge config
-- File: ~/.config/dock-bridge/config.lua (or $XDG_CONFIG_HOME/dock-bridge/config.lua)
return {
  sources = {
    -- Installed application entries (deleted/updated launcher items).
    launcher = true,
    -- Fullscreen launcher shown/hidden.
    launcher_front = true,
    -- Window manager switches.
    wm_switcher = true,
    -- Compositor window management: true, false or "auto" (Wayland sessions only).
    compositor = false,
  },

  -- Control socket. Empty means $XDG_RUNTIME_DIR/dock-bridge.sock.
  socket = "",
}
"#
}

fn lua_loader_script() -> &'static str {
    r#"
local path = os.getenv("DOCK_BRIDGE_CONFIG_PATH")
if type(path) ~= "string" or path == "" then
  io.stderr:write("DOCK_BRIDGE_CONFIG_PATH is not set\n")
  os.exit(1)
end

local chunk, load_err = loadfile(path)
if not chunk then
  io.stderr:write(load_err .. "\n")
  os.exit(1)
end

local ok, result = pcall(chunk)
if not ok then
  io.stderr:write(tostring(result) .. "\n")
  os.exit(1)
end

local cfg = nil
if type(result) == "table" then
  cfg = result
elseif type(_G.config) == "table" then
  cfg = _G.config
else
  cfg = {}
end

local function emit(key, value)
  io.write(key)
  io.write("=")
  io.write(tostring(value))
  io.write("\n")
end

local function flatten(prefix, value)
  local kind = type(value)
  if kind == "table" then
    for key, inner in pairs(value) do
      local name = tostring(key)
      if prefix ~= "" then
        name = prefix .. "." .. name
      end
      flatten(name, inner)
    end
  elseif kind == "string" then
    if string.find(value, "\n", 1, true) then
      io.stderr:write(prefix .. " must not contain newlines\n")
      os.exit(1)
    end
    emit(prefix, value)
  elseif kind == "number" or kind == "boolean" then
    emit(prefix, value)
  else
    io.stderr:write(prefix .. " has unsupported type " .. kind .. "\n")
    os.exit(1)
  end
end

flatten("", cfg)
"#
}
