use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub fonts: FontConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    pub api_root: Option<String>,
    pub upload_retries: Option<u32>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FontConfig {
    pub regular: Option<PathBuf>,
    pub bold: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_crf")]
    pub crf: u32,
    pub ffmpeg: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            batch_size: default_batch_size(),
            scale: default_scale(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            smoothing: default_smoothing(),
            window_size: default_window_size(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            crf: default_crf(),
            ffmpeg: None,
        }
    }
}

fn default_fps() -> u32 { 30 }
fn default_batch_size() -> usize { 30 }
fn default_scale() -> f32 { 1.5 }
fn default_jpeg_quality() -> u8 { 95 }
fn default_smoothing() -> f32 { 0.65 }
fn default_window_size() -> usize { 2048 }
fn default_codec() -> String { "libx264".into() }
fn default_crf() -> u32 { 18 }

/// `vinylcast.toml` in the working directory, then
/// `~/.config/vinylcast/config.toml`, then the platform config dir.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("vinylcast.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("vinylcast").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("vinylcast").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match parse_config(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Ignoring {}: {}", path.display(), e);
            None
        }
    }
}

pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}
