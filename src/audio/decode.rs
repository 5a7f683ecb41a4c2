use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac"];

/// Decoded mono audio, read-only after load.
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Resolve the audio source: a file is used as-is, a directory yields its
/// first entry with a recognized audio extension (sorted by name).
pub fn resolve_source(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
            .with_context(|| format!("Failed to read directory: {}", path.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        entries.sort();
        return entries
            .into_iter()
            .next()
            .with_context(|| format!("No audio files found in {}", path.display()));
    }
    anyhow::bail!("Audio source not found: {}", path.display());
}

/// Decode the whole file to mono f32. Fatal on unreadable/undecodable input
/// or on inconsistent stream metadata.
pub fn decode_audio(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio format: {}", path.display()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
    if sample_rate == 0 {
        anyhow::bail!("Invalid sample rate in {}", path.display());
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        downmix_into(sample_buf.samples(), channels, &mut samples);
    }

    if samples.is_empty() {
        anyhow::bail!("Decoded no audio samples from {}", path.display());
    }

    let audio = AudioData { samples, sample_rate };
    log::info!(
        "Decoded {}: {} samples, {}Hz, {:.2}s",
        path.display(),
        audio.samples.len(),
        audio.sample_rate,
        audio.duration()
    );

    Ok(audio)
}

fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    for frame in interleaved.chunks(channels) {
        out.push(frame.iter().sum::<f32>() / channels as f32);
    }
}
