use crate::core::gfx::{BackendType, DeviceSettings};
use log::{LevelFilter, info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

const CONFIG_PATH: &str = "gfxlayer.ini";

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content);
        Ok(())
    }

    pub fn parse(&mut self, content: &str) {
        self.sections.clear();
        let mut section = String::new();

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                self.sections.entry(section.clone()).or_default();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            self.sections
                .entry(section.clone())
                .or_default()
                .insert(key.to_string(), value.trim().to_string());
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section).and_then(|s| s.get(key)).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub video_renderer: BackendType,
    pub vsync: bool,
    pub mipmaps: bool,
    pub managed_textures: bool,
    pub display_width: u32,
    pub display_height: u32,
    pub log_level: LogLevel,
    /// How long to sleep between polls while the device is lost.
    pub lost_context_poll_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video_renderer: BackendType::BufferObject,
            vsync: true,
            mipmaps: true,
            managed_textures: true,
            display_width: 1280,
            display_height: 720,
            log_level: LogLevel::Info,
            lost_context_poll_ms: 16,
        }
    }
}

impl Config {
    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            width: self.display_width,
            height: self.display_height,
            vsync: self.vsync,
            mipmaps: self.mipmaps,
            managed_textures: self.managed_textures,
            lost_context_poll: Duration::from_millis(self.lost_context_poll_ms),
            ..DeviceSettings::default()
        }
    }

    /// Overlays every key present in `conf`, keeping defaults for the rest.
    fn read_from(conf: &SimpleIni) -> Self {
        let default = Self::default();
        let flag = |key: &str, fallback: bool| {
            conf.get("Options", key)
                .and_then(|v| v.parse::<u8>().ok())
                .map_or(fallback, |v| v != 0)
        };

        Self {
            video_renderer: conf
                .get("Options", "VideoRenderer")
                .and_then(|v| match BackendType::from_str(&v) {
                    Ok(ty) => Some(ty),
                    Err(e) => {
                        warn!("{e}, using {}.", default.video_renderer);
                        None
                    }
                })
                .unwrap_or(default.video_renderer),
            vsync: flag("Vsync", default.vsync),
            mipmaps: flag("Mipmaps", default.mipmaps),
            managed_textures: flag("ManagedTextures", default.managed_textures),
            display_width: conf
                .get("Options", "DisplayWidth")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|&w| w > 0)
                .unwrap_or(default.display_width),
            display_height: conf
                .get("Options", "DisplayHeight")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|&h| h > 0)
                .unwrap_or(default.display_height),
            log_level: conf
                .get("Options", "LogLevel")
                .and_then(|v| LogLevel::from_str(&v).ok())
                .unwrap_or(default.log_level),
            lost_context_poll_ms: conf
                .get("Options", "LostContextPollMs")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default.lost_context_poll_ms),
        }
    }

    // [Options] keys in alphabetical order.
    fn to_ini(&self) -> String {
        let bit = |b: bool| if b { "1" } else { "0" };
        let mut content = String::new();
        content.push_str("[Options]\n");
        content.push_str(&format!("DisplayHeight={}\n", self.display_height));
        content.push_str(&format!("DisplayWidth={}\n", self.display_width));
        content.push_str(&format!("LogLevel={}\n", self.log_level.as_str()));
        content.push_str(&format!("LostContextPollMs={}\n", self.lost_context_poll_ms));
        content.push_str(&format!("ManagedTextures={}\n", bit(self.managed_textures)));
        content.push_str(&format!("Mipmaps={}\n", bit(self.mipmaps)));
        content.push_str(&format!("VideoRenderer={}\n", self.video_renderer));
        content.push_str(&format!("Vsync={}\n", bit(self.vsync)));
        content.push('\n');
        content
    }
}

// Global, mutable configuration instance.
static CONFIG: LazyLock<Mutex<Config>> = LazyLock::new(|| Mutex::new(Config::default()));

// A poisoned lock still holds a usable Config.
fn lock() -> std::sync::MutexGuard<'static, Config> {
    CONFIG.lock().unwrap_or_else(|e| e.into_inner())
}

// --- File I/O ---

fn create_default_config_file() -> Result<(), std::io::Error> {
    info!("'{CONFIG_PATH}' not found, creating with default values.");
    std::fs::write(CONFIG_PATH, Config::default().to_ini())
}

pub fn load() {
    if !Path::new(CONFIG_PATH).exists()
        && let Err(e) = create_default_config_file()
    {
        warn!("Failed to create default config file: {e}");
    }

    let mut conf = SimpleIni::new();
    match conf.load(CONFIG_PATH) {
        Ok(()) => {
            let cfg = Config::read_from(&conf);
            *lock() = cfg;
            info!("Configuration loaded from '{CONFIG_PATH}'.");
        }
        Err(e) => warn!("Failed to load '{CONFIG_PATH}': {e}. Using default values."),
    }
}

fn save() {
    let content = lock().to_ini();
    if let Err(e) = std::fs::write(CONFIG_PATH, content) {
        warn!("Failed to save config file: {e}");
    }
}

pub fn get() -> Config {
    *lock()
}

pub fn update_vsync(enabled: bool) {
    {
        let mut cfg = lock();
        if cfg.vsync == enabled {
            return;
        }
        cfg.vsync = enabled;
    }
    save();
}

pub fn update_video_renderer(renderer: BackendType) {
    {
        let mut cfg = lock();
        if cfg.video_renderer == renderer {
            return;
        }
        cfg.video_renderer = renderer;
    }
    save();
}
