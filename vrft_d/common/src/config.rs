use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub osc: OscConfig,
    pub modules: ModuleConfig,
    pub status_host: StatusHostConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    #[serde(alias = "osc_send_address")]
    pub send_address: String,
    #[serde(alias = "osc_send_port")]
    pub send_port: u16,
    /// Port we listen on for `/avatar/change`.
    pub receive_port: u16,
    pub tick_ms: u64,
    pub max_bundle_bytes: usize,
    /// Discover the avatar's parameters over OSC Query.
    pub query_enabled: bool,
    /// Parameter addresses to treat as relevant when OSC Query is disabled.
    pub static_parameters: Vec<String>,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            send_address: "127.0.0.1".to_string(),
            send_port: 9000,
            receive_port: 9001,
            tick_ms: 10,
            max_bundle_bytes: 4096,
            query_enabled: true,
            static_parameters: Vec::new(),
        }
    }
}

impl OscConfig {
    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.send_address, self.send_port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Directory scanned for native module libraries. Created if missing.
    pub directory: PathBuf,
    pub eye: bool,
    pub lip: bool,
    pub max_fps: Option<f32>,
    /// Enables the built-in UDP JSON source on this port.
    pub udp_source_port: Option<u16>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("plugins/native"),
            eye: true,
            lip: true,
            max_fps: Some(200.0),
            udp_source_port: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusHostConfig {
    pub enabled: bool,
    /// 0 picks a free port.
    pub port: u16,
}

impl Config {
    /// Reads `path`, or writes the defaults there when it does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading config from {:?}", path);
            let file = fs::File::open(path)
                .with_context(|| format!("Failed to open config {:?}", path))?;
            let reader = std::io::BufReader::new(file);
            let config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config {:?}", path))?;
            Ok(config)
        } else {
            info!("Config not found. Creating default at {:?}", path);
            let config = Config::default();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create config dir {:?}", parent))?;
                }
            }
            let file = fs::File::create(path)
                .with_context(|| format!("Failed to create config {:?}", path))?;
            let writer = std::io::BufWriter::new(file);
            serde_json::to_writer_pretty(writer, &config)?;
            Ok(config)
        }
    }

    /// Minimum time between frames of a module's run loop. Zero means unpaced.
    pub fn frame_interval(&self) -> Duration {
        match self.modules.max_fps {
            Some(fps) if fps > 0.0 => Duration::try_from_secs_f32(1.0 / fps).unwrap_or_else(|e| {
                warn!("Ignoring max_fps {}: {}. Module frames are unpaced.", fps, e);
                Duration::ZERO
            }),
            _ => Duration::ZERO,
        }
    }
}
