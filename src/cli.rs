use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pulsar", about = "Radial audio spectrum visualizer with video export")]
pub struct Cli {
    /// Input audio file (MP3, WAV, FLAC, OGG) or a directory to search
    pub input: Option<PathBuf>,

    /// Config file path (defaults to pulsar.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Render width in pixels
    #[arg(long, default_value_t = 1080)]
    pub width: u32,

    /// Render height in pixels
    #[arg(long, default_value_t = 1920)]
    pub height: u32,

    /// Number of frequency bars
    #[arg(long, default_value_t = 128)]
    pub bins: usize,

    /// FFT size for spectral analysis
    #[arg(long, default_value_t = 2048)]
    pub fft_size: usize,

    /// Bar smoothing factor (0.0 = raw, closer to 1.0 = smoother)
    #[arg(long, default_value_t = 0.95)]
    pub smoothing: f32,

    /// Export frames per second
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// Live tick rate (frames per second) when previewing
    #[arg(long, default_value_t = 30)]
    pub frame_rate: u32,

    /// Seconds of tail frames after the audio ends the export
    #[arg(long, default_value_t = 2.0)]
    pub eos_buffer: f64,

    /// Force video export (overrides the config file)
    #[arg(long)]
    pub export: bool,

    /// Play the audio live with a terminal preview instead of exporting
    #[arg(long, conflicts_with = "export")]
    pub live: bool,
}
