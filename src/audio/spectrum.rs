use anyhow::Result;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::decode::AudioData;

/// Lowest analyzed frequency. Bars below this are not musically useful.
const MIN_FREQ: f64 = 20.0;

/// Precomputed mapping from display bin to a half-open range of FFT output
/// indices. Bin edges are log-spaced in frequency between `MIN_FREQ` and
/// Nyquist, converted to index space once at startup.
pub struct BinTable {
    ranges: Vec<(usize, usize)>,
    spectrum_len: usize,
}

impl BinTable {
    pub fn new(num_bins: usize, fft_size: usize, sample_rate: u32) -> Result<Self> {
        if num_bins == 0 {
            anyhow::bail!("Bin count must be at least 1");
        }
        if fft_size < 2 {
            anyhow::bail!("FFT size must be at least 2 (got {})", fft_size);
        }
        let sr = sample_rate as f64;
        if !(sr.is_finite() && sr > 0.0) {
            anyhow::bail!("Invalid sample rate: {}", sample_rate);
        }

        let max_freq = sr / 2.0;
        let lg_min = MIN_FREQ.log10();
        let lg_max = max_freq.log10();

        // Log-spaced bin edges in frequency, then floor to FFT index space.
        let mut edges: Vec<usize> = (0..=num_bins)
            .map(|i| {
                let freq = 10f64.powf(lg_min + (lg_max - lg_min) * i as f64 / num_bins as f64);
                (freq * fft_size as f64 / sr).floor() as usize
            })
            .collect();

        // At low frequencies several log-spaced edges can land on the same
        // integer index, which would leave that bar permanently empty. Bump
        // any collapsed edge forward by one.
        for i in 1..edges.len() {
            if edges[i] <= edges[i - 1] {
                edges[i] = edges[i - 1] + 1;
            }
        }

        let spectrum_len = fft_size / 2 + 1;
        if *edges.last().unwrap_or(&0) > spectrum_len {
            anyhow::bail!(
                "Bin table overflows the spectrum: {} bins do not fit {} FFT bins",
                num_bins,
                spectrum_len
            );
        }

        let ranges = edges.windows(2).map(|w| (w[0], w[1])).collect();
        Ok(Self { ranges, spectrum_len })
    }

    pub fn num_bins(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }
}

/// Spectral feature extractor: owns the decoded samples and a planned FFT,
/// and maps an instant of audio time to one magnitude per display bin.
pub struct SpectrumAnalyzer {
    audio: AudioData,
    table: BinTable,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(audio: AudioData, num_bins: usize, fft_size: usize) -> Result<Self> {
        let table = BinTable::new(num_bins, fft_size, audio.sample_rate)?;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Ok(Self {
            audio,
            table,
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
        })
    }

    pub fn duration(&self) -> f64 {
        self.audio.duration()
    }

    pub fn num_bins(&self) -> usize {
        self.table.num_bins()
    }

    /// Analyze one instant of audio time. Returns `None` once the instant is
    /// at or past the end of the track; this is the end-of-audio signal, not
    /// an error.
    pub fn analyze(&mut self, instant: f64) -> Option<Vec<f32>> {
        if instant >= self.duration() {
            return None;
        }

        let start = (instant * self.audio.sample_rate as f64).floor() as usize;
        fill_window(&self.audio.samples, start, &mut self.buffer);
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let magnitudes: Vec<f32> = self.buffer[..self.table.spectrum_len]
            .iter()
            .map(|c| c.norm())
            .collect();

        let binned = self
            .table
            .ranges()
            .iter()
            .map(|&(lo, hi)| magnitudes[lo..hi].iter().copied().fold(0.0f32, f32::max))
            .collect();

        Some(binned)
    }
}

/// Copy `buffer.len()` samples starting at `start` into the FFT buffer,
/// zero-padding on the right when the track runs out.
fn fill_window(samples: &[f32], start: usize, buffer: &mut [Complex<f32>]) {
    let mut filled = 0;
    for (slot, &s) in buffer.iter_mut().zip(samples.iter().skip(start)) {
        *slot = Complex::new(s, 0.0);
        filled += 1;
    }
    for slot in &mut buffer[filled..] {
        *slot = Complex::new(0.0, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sample_rate: u32, seconds: f32) -> AudioData {
        let n = (sample_rate as f32 * seconds) as usize;
        let samples = (0..n)
            .map(|i| {
                (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect();
        AudioData { samples, sample_rate }
    }

    #[test]
    fn bin_table_ranges_are_nonempty_and_monotonic() {
        for &(num_bins, fft_size, sr) in &[
            (128usize, 2048usize, 44100u32),
            (128, 2048, 22050),
            (64, 1024, 48000),
            (32, 512, 8000),
            (16, 4096, 96000),
        ] {
            let table = BinTable::new(num_bins, fft_size, sr).unwrap();
            assert_eq!(table.num_bins(), num_bins);
            let mut prev_end = 0;
            for &(start, end) in table.ranges() {
                assert!(start < end, "empty bin in ({num_bins},{fft_size},{sr})");
                assert!(start >= prev_end, "overlap in ({num_bins},{fft_size},{sr})");
                prev_end = end;
            }
            assert!(prev_end <= fft_size / 2 + 1);
        }
    }

    #[test]
    fn bin_table_repair_fires_at_low_frequencies() {
        // 128 log-spaced edges over a 2048-point FFT collapse at the bottom:
        // the first raw edges are all index 0 without repair.
        let table = BinTable::new(128, 2048, 44100).unwrap();
        let (start, end) = table.ranges()[0];
        assert_eq!((start, end), (0, 1));
        let (s1, e1) = table.ranges()[1];
        assert_eq!(s1, 1);
        assert!(e1 > s1);
    }

    #[test]
    fn bin_table_rejects_too_many_bins() {
        assert!(BinTable::new(512, 64, 44100).is_err());
    }

    #[test]
    fn silence_analyzes_to_zeros() {
        let audio = AudioData {
            samples: vec![0.0; 44100],
            sample_rate: 44100,
        };
        let mut analyzer = SpectrumAnalyzer::new(audio, 64, 1024).unwrap();
        let bins = analyzer.analyze(0.25).unwrap();
        assert_eq!(bins.len(), 64);
        assert!(bins.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn end_of_audio_returns_none() {
        let audio = tone(440.0, 44100, 2.0);
        let duration = audio.duration();
        let mut analyzer = SpectrumAnalyzer::new(audio, 64, 1024).unwrap();

        assert!(analyzer.analyze(duration).is_none());
        assert!(analyzer.analyze(duration + 5.0).is_none());
        assert!(analyzer.analyze(duration - 1e-4).is_some());
    }

    #[test]
    fn magnitudes_are_nonnegative_and_sized() {
        let audio = tone(1000.0, 44100, 1.0);
        let mut analyzer = SpectrumAnalyzer::new(audio, 128, 2048).unwrap();
        let bins = analyzer.analyze(0.5).unwrap();
        assert_eq!(bins.len(), 128);
        assert!(bins.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn tone_peaks_in_its_own_bin() {
        let sr = 44100u32;
        let fft_size = 2048usize;
        let audio = tone(1000.0, sr, 1.0);
        let table = BinTable::new(128, fft_size, sr).unwrap();
        let tone_index = (1000.0 * fft_size as f64 / sr as f64).floor() as usize;
        let expected_bin = table
            .ranges()
            .iter()
            .position(|&(s, e)| tone_index >= s && tone_index < e)
            .unwrap();

        let mut analyzer = SpectrumAnalyzer::new(audio, 128, fft_size).unwrap();
        let bins = analyzer.analyze(0.25).unwrap();
        let loudest = bins
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, expected_bin);
    }

    #[test]
    fn window_zero_pads_past_the_end() {
        let samples = vec![1.0f32; 10];
        let mut buffer = vec![Complex::new(9.0, 9.0); 16];
        fill_window(&samples, 4, &mut buffer);
        for slot in &buffer[..6] {
            assert_eq!(slot.re, 1.0);
        }
        for slot in &buffer[6..] {
            assert_eq!((slot.re, slot.im), (0.0, 0.0));
        }
    }

    #[test]
    fn analysis_near_the_end_pads_instead_of_truncating() {
        // Only a handful of samples remain at this instant; the window must
        // still be a full FFT frame and the bin pass must not panic.
        let audio = tone(440.0, 8000, 1.0);
        let duration = audio.duration();
        let mut analyzer = SpectrumAnalyzer::new(audio, 32, 512).unwrap();
        let bins = analyzer.analyze(duration - 0.001).unwrap();
        assert_eq!(bins.len(), 32);
    }
}
