use anyhow::{Context, Result};
use rodio::{Decoder, OutputStream, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use crate::timeline::Transport;

/// Plays the source file through the default output device and reports the
/// playback position for the live clock.
pub struct AudioPlayback {
    // Dropping the stream kills the sink; keep it for the playback lifetime.
    #[allow(dead_code)]
    stream: OutputStream,
    sink: Sink,
    started: Instant,
}

impl AudioPlayback {
    pub fn start(path: &Path) -> Result<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().context("No audio output device available")?;

        let file = BufReader::new(
            File::open(path)
                .with_context(|| format!("Failed to open audio file: {}", path.display()))?,
        );
        let source = Decoder::new(file)
            .with_context(|| format!("Failed to decode for playback: {}", path.display()))?;

        let sink = Sink::try_new(&stream_handle).context("Failed to create playback sink")?;
        sink.append(source);
        sink.play();
        log::info!("Playback started: {}", path.display());

        Ok(Self {
            stream,
            sink,
            started: Instant::now(),
        })
    }
}

impl Transport for AudioPlayback {
    fn position(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty() && !self.sink.is_paused()
    }
}
