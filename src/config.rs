use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Audio source path or directory; CLI positional wins when given.
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub visual: VisualConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize)]
pub struct LiveConfig {
    /// Live-mode tick rate.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

#[derive(Debug, Deserialize)]
pub struct VisualConfig {
    /// Number of frequency bars.
    #[serde(default = "default_bins")]
    pub bins: usize,
    /// Inner circle radius; bars start here.
    #[serde(default = "default_min_radius")]
    pub min_radius: f32,
    #[serde(default = "default_height_multiplier")]
    pub bar_height_multiplier: f32,
    /// Weight of the previous frame in the bar-height blend, in [0, 1).
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_background")]
    pub background: [u8; 3],
    #[serde(default = "default_color_start")]
    pub color_start: [u8; 3],
    #[serde(default = "default_color_end")]
    pub color_end: [u8; 3],
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    /// FFT length; a power of two performs best.
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_enabled")]
    pub enabled: bool,
    #[serde(default = "default_export_width")]
    pub width: u32,
    #[serde(default = "default_export_height")]
    pub height: u32,
    #[serde(default = "default_export_fps")]
    pub fps: f64,
    #[serde(default = "default_filename")]
    pub filename: PathBuf,
    /// Seconds of tail frames rendered after the audio ends.
    #[serde(default = "default_eos_buffer")]
    pub eos_buffer_seconds: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
        }
    }
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            bins: default_bins(),
            min_radius: default_min_radius(),
            bar_height_multiplier: default_height_multiplier(),
            smoothing: default_smoothing(),
            background: default_background(),
            color_start: default_color_start(),
            color_end: default_color_end(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: default_export_enabled(),
            width: default_export_width(),
            height: default_export_height(),
            fps: default_export_fps(),
            filename: default_filename(),
            eos_buffer_seconds: default_eos_buffer(),
        }
    }
}

fn default_export_width() -> u32 { 1080 }
fn default_export_height() -> u32 { 1920 }
fn default_frame_rate() -> u32 { 30 }
fn default_bins() -> usize { 128 }
fn default_min_radius() -> f32 { 150.0 }
fn default_height_multiplier() -> f32 { 10.0 }
fn default_smoothing() -> f32 { 0.95 }
fn default_background() -> [u8; 3] { [5, 5, 25] }
fn default_color_start() -> [u8; 3] { [20, 50, 255] }
fn default_color_end() -> [u8; 3] { [220, 50, 105] }
fn default_fft_size() -> usize { 2048 }
fn default_export_enabled() -> bool { true }
fn default_export_fps() -> f64 { 30.0 }
fn default_filename() -> PathBuf { PathBuf::from("output.mp4") }
fn default_eos_buffer() -> f64 { 2.0 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}
