mod audio;
mod cli;
mod config;
mod encode;
mod render;
mod timeline;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use audio::playback::AudioPlayback;
use audio::smoothing::Smoother;
use audio::spectrum::SpectrumAnalyzer;
use cli::Cli;
use encode::ffmpeg::{ExportPipeline, ExportSettings};
use render::bars::{BarStyle, Frame, RadialBars};
use render::preview::TerminalPreview;
use timeline::{TickPlan, Timeline};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect pulsar.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("pulsar.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("pulsar").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("pulsar").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });

    let mut cfg = config::Config::default();
    if let Some(ref path) = config_path {
        if let Some(loaded) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    // Merge: config values apply only when the CLI flag is at its default
    if cli.width == 1080 { cli.width = cfg.export.width; }
    if cli.height == 1920 { cli.height = cfg.export.height; }
    if cli.fps == 30.0 { cli.fps = cfg.export.fps; }
    if cli.bins == 128 { cli.bins = cfg.visual.bins; }
    if cli.fft_size == 2048 { cli.fft_size = cfg.analysis.fft_size; }
    if cli.smoothing == 0.95 { cli.smoothing = cfg.visual.smoothing; }
    if cli.frame_rate == 30 { cli.frame_rate = cfg.live.frame_rate; }
    if cli.eos_buffer == 2.0 { cli.eos_buffer = cfg.export.eos_buffer_seconds; }
    if cli.output == Path::new("output.mp4") { cli.output = cfg.export.filename.clone(); }

    let export_enabled = if cli.live {
        false
    } else {
        cli.export || cfg.export.enabled
    };

    let source = cli
        .input
        .clone()
        .or(cfg.input.clone())
        .context("Input audio file is required")?;
    let input = audio::decode::resolve_source(&source)?;

    log::info!("pulsar - radial audio spectrum visualizer");
    log::info!("Input: {}", input.display());
    if export_enabled {
        log::info!(
            "Export: {} ({}x{} @ {}fps)",
            cli.output.display(),
            cli.width,
            cli.height,
            cli.fps
        );
    }

    let audio_data = audio::decode::decode_audio(&input)?;
    let duration = audio_data.duration();

    let mut analyzer = SpectrumAnalyzer::new(audio_data, cli.bins, cli.fft_size)?;
    let mut smoother = Smoother::new(analyzer.num_bins(), cli.smoothing)?;
    let bars = RadialBars::new(
        analyzer.num_bins(),
        BarStyle {
            min_radius: cfg.visual.min_radius,
            height_multiplier: cfg.visual.bar_height_multiplier,
            background: cfg.visual.background,
            color_start: cfg.visual.color_start,
            color_end: cfg.visual.color_end,
        },
    );

    if export_enabled {
        let settings = ExportSettings {
            width: cli.width,
            height: cli.height,
            fps: cli.fps,
            audio_path: input,
            output_path: cli.output.clone(),
        };
        run_export(&mut analyzer, &mut smoother, &bars, settings, cli.eos_buffer, duration)?;
        log::info!("Done! Output: {}", cli.output.display());
    } else {
        run_live(&mut analyzer, &mut smoother, &input, cli.frame_rate)?;
        log::info!("Playback finished");
    }

    Ok(())
}

/// Export run: deterministic fixed-step clock, frames piped to ffmpeg, then
/// the mux/trim passes reconcile the clip length with the audio duration.
fn run_export(
    analyzer: &mut SpectrumAnalyzer,
    smoother: &mut Smoother,
    bars: &RadialBars,
    settings: ExportSettings,
    eos_buffer: f64,
    duration: f64,
) -> Result<()> {
    let mut frame = Frame::new(settings.width, settings.height);
    let fps = settings.fps;
    let mut pipeline = ExportPipeline::open(settings)?;
    let mut timeline = Timeline::fixed_step(fps, eos_buffer)?;

    let total_frames = ((duration + eos_buffer) * fps).ceil() as u64;
    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .unwrap()
            .progress_chars("=>-"),
    );

    loop {
        let render = match timeline.tick() {
            TickPlan::Stop => break,
            TickPlan::Analyze(instant) => match analyzer.analyze(instant) {
                Some(raw) => {
                    smoother.update(&raw);
                    true
                }
                // End of audio: keep the last bar heights for the tail.
                None => timeline.note_end_of_audio(),
            },
            TickPlan::Hold => true,
        };

        if !render {
            continue;
        }

        bars.draw(smoother.state(), &mut frame);
        pipeline.write_frame(&frame.pixels)?;
        pb.inc(1);
    }

    pb.finish_with_message("Rendering complete");
    debug_assert!(timeline.stopped());
    pipeline.finish(duration)
}

/// Live run: wall-clock playback position drives analysis; a terminal meter
/// stands in for the display collaborator. The loop paces itself to the
/// configured tick rate.
fn run_live(
    analyzer: &mut SpectrumAnalyzer,
    smoother: &mut Smoother,
    input: &Path,
    frame_rate: u32,
) -> Result<()> {
    if frame_rate == 0 {
        anyhow::bail!("Live frame rate must be positive");
    }

    let playback = AudioPlayback::start(input)?;
    let mut timeline = Timeline::live(Box::new(playback));
    let mut preview = TerminalPreview::new()?;
    let tick_budget = Duration::from_secs_f64(1.0 / frame_rate as f64);

    loop {
        let tick_start = Instant::now();

        match timeline.tick() {
            TickPlan::Stop => break,
            TickPlan::Analyze(instant) => match analyzer.analyze(instant) {
                Some(raw) => {
                    smoother.update(&raw);
                }
                None => {
                    timeline.note_end_of_audio();
                    continue;
                }
            },
            TickPlan::Hold => {}
        }

        preview.render(smoother.state())?;

        // The sink can drain before the clock reaches the decoded duration
        // (output latency, rounding in the container duration). Stop with it.
        if timeline.transport_idle() {
            break;
        }

        if let Some(remaining) = tick_budget.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    if timeline.ended() {
        log::info!("End of audio reached");
    } else {
        log::info!("Playback sink drained early");
    }

    Ok(())
}
