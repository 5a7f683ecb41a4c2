use anyhow::{Context, Result};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use thiserror::Error;

/// The three subprocess stages of an export, in the order they must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Raw RGBA frames piped into a video-only intermediate.
    Encode,
    /// Intermediate video combined with the original audio; video copied
    /// verbatim, audio re-encoded.
    Mux,
    /// Combined file cut to the true audio duration, producing the final
    /// artifact.
    Trim,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Encode => write!(f, "encode"),
            Stage::Mux => write!(f, "mux"),
            Stage::Trim => write!(f, "trim"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("ffmpeg {stage} stage failed for {}:\n{detail}", .file.display())]
    StageFailed {
        stage: Stage,
        file: PathBuf,
        detail: String,
    },
}

pub struct ExportSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
}

/// Streams rendered frames to an ffmpeg encoder and, on finish, muxes and
/// trims the result so the final clip's video length matches the audio
/// exactly. Intermediates never survive, whether the run succeeds or not.
pub struct ExportPipeline {
    settings: ExportSettings,
    program: &'static str,
    encoder: Option<Child>,
    video_tmp: PathBuf,
    mux_tmp: PathBuf,
    frames_written: u64,
}

impl ExportPipeline {
    /// Spawn the encoder before any frame exists, writing to an intermediate
    /// file next to the final output (never the final path itself).
    pub fn open(settings: ExportSettings) -> Result<Self> {
        Self::open_with("ffmpeg", settings)
    }

    // Tests substitute the subprocess so the stage sequencing and cleanup
    // can run without a real encoder.
    fn open_with(program: &'static str, settings: ExportSettings) -> Result<Self> {
        let video_tmp = temp_sibling(&settings.output_path, "video");
        let mux_tmp = temp_sibling(&settings.output_path, "mux");

        let args = encode_args(settings.width, settings.height, settings.fps, &video_tmp);
        let encoder = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "Export started: {}x{} @ {}fps -> {}",
            settings.width,
            settings.height,
            settings.fps,
            settings.output_path.display()
        );

        Ok(Self {
            settings,
            program,
            encoder: Some(encoder),
            video_tmp,
            mux_tmp,
            frames_written: 0,
        })
    }

    /// Write one frame, in display order. A slow encoder applies backpressure
    /// through the pipe; this call blocks rather than dropping frames.
    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        let expected = (self.settings.width * self.settings.height * 4) as usize;
        if rgba_pixels.len() != expected {
            anyhow::bail!(
                "Frame size mismatch: got {} bytes, expected {}",
                rgba_pixels.len(),
                expected
            );
        }
        let encoder = self.encoder.as_mut().context("Export already finished")?;
        let stdin = encoder.stdin.as_mut().context("Encoder stdin not available")?;
        stdin
            .write_all(rgba_pixels)
            .context("Failed to write frame to ffmpeg")?;
        self.frames_written += 1;
        Ok(())
    }

    /// Run the remaining stages in strict order: flush the video-only
    /// intermediate, mux it with the source audio, trim the result to the
    /// audio's true duration, then delete the intermediates. A failed stage
    /// aborts the sequence and removes any partial final artifact.
    pub fn finish(mut self, audio_duration: f64) -> Result<()> {
        let result = self.run_stages(audio_duration);

        remove_quietly(&self.video_tmp);
        remove_quietly(&self.mux_tmp);
        if result.is_err() {
            remove_quietly(&self.settings.output_path);
        }

        result
    }

    fn run_stages(&mut self, audio_duration: f64) -> Result<()> {
        let mut encoder = self.encoder.take().context("Export already finished")?;

        // Stage 1: EOF on the pipe, wait for the encoder to flush.
        drop(encoder.stdin.take());
        let output = encoder
            .wait_with_output()
            .context("Failed to wait for ffmpeg encoder")?;
        if !output.status.success() {
            return Err(ExportError::StageFailed {
                stage: Stage::Encode,
                file: self.video_tmp.clone(),
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
        log::info!(
            "Video stream flushed: {} frames -> {}",
            self.frames_written,
            self.video_tmp.display()
        );

        // Stage 2: combine with the original audio.
        run_stage(
            self.program,
            Stage::Mux,
            mux_args(&self.video_tmp, &self.settings.audio_path, &self.mux_tmp),
            &self.mux_tmp,
        )?;

        // Stage 3: the drain tail and encoder padding leave the video longer
        // than the audio; cut the clip to the true duration.
        run_stage(
            self.program,
            Stage::Trim,
            trim_args(&self.mux_tmp, audio_duration, &self.settings.output_path),
            &self.settings.output_path,
        )?;

        log::info!("Export complete: {}", self.settings.output_path.display());
        Ok(())
    }
}

impl Drop for ExportPipeline {
    fn drop(&mut self) {
        // Abandoned mid-run: kill the encoder and clear the intermediates.
        if let Some(mut encoder) = self.encoder.take() {
            let _ = encoder.kill();
            let _ = encoder.wait();
            remove_quietly(&self.video_tmp);
            remove_quietly(&self.mux_tmp);
        }
    }
}

fn run_stage(program: &str, stage: Stage, args: Vec<String>, produced: &Path) -> Result<()> {
    log::info!("Running ffmpeg {} stage...", stage);
    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("Failed to run ffmpeg {} stage", stage))?;

    if !output.status.success() {
        return Err(ExportError::StageFailed {
            stage,
            file: produced.to_path_buf(),
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .into());
    }
    Ok(())
}

fn encode_args(width: u32, height: u32, fps: f64, video_tmp: &Path) -> Vec<String> {
    // The encoder's stderr is only drained after the last frame, so it must
    // stay quiet while frames stream in: with the default stats spam the
    // pipe buffer fills, ffmpeg blocks on stderr and stops reading stdin,
    // and write_frame wedges. Errors still come through at this loglevel.
    vec![
        "-y".into(),
        "-nostats".into(),
        "-loglevel".into(), "error".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", width, height),
        "-framerate".into(), format_fps(fps),
        "-i".into(), "pipe:0".into(),
        "-c:v".into(), "libx264".into(),
        "-pix_fmt".into(), "yuv420p".into(),
        video_tmp.to_string_lossy().into_owned(),
    ]
}

fn mux_args(video: &Path, audio: &Path, combined: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(), video.to_string_lossy().into_owned(),
        "-i".into(), audio.to_string_lossy().into_owned(),
        "-c:v".into(), "copy".into(),
        "-c:a".into(), "aac".into(),
        "-b:a".into(), "192k".into(),
        combined.to_string_lossy().into_owned(),
    ]
}

fn trim_args(combined: &Path, duration: f64, final_output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(), combined.to_string_lossy().into_owned(),
        "-t".into(), format!("{:.3}", duration),
        "-c".into(), "copy".into(),
        final_output.to_string_lossy().into_owned(),
    ]
}

fn format_fps(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{}", fps)
    }
}

/// Intermediate path derived from the final output, e.g. `out.mp4` ->
/// `out.video.tmp.mp4`.
fn temp_sibling(output: &Path, tag: &str) -> PathBuf {
    output.with_extension(format!("{}.tmp.mp4", tag))
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
    }
}
