use anyhow::Result;
use crossterm::{cursor, execute, terminal};
use std::io::{stdout, Stdout, Write};

const BLOCKS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One-line spectrum meter for live runs, redrawn in place each tick.
/// Heights are scaled against the loudest magnitude seen so far.
pub struct TerminalPreview {
    stdout: Stdout,
    columns: usize,
    peak: f32,
}

impl TerminalPreview {
    pub fn new() -> Result<Self> {
        let (cols, _) = terminal::size().unwrap_or((80, 24));
        let mut out = stdout();
        execute!(out, cursor::Hide)?;
        Ok(Self {
            stdout: out,
            columns: cols as usize,
            peak: 1e-6,
        })
    }

    pub fn render(&mut self, magnitudes: &[f32]) -> Result<()> {
        for &m in magnitudes {
            self.peak = self.peak.max(m);
        }

        let cols = self.columns.min(magnitudes.len()).max(1);
        let mut line = String::with_capacity(cols * 4);
        for c in 0..cols {
            let idx = c * magnitudes.len() / cols;
            line.push(BLOCKS[block_level(magnitudes[idx], self.peak)]);
        }

        write!(self.stdout, "\r{}", line)?;
        self.stdout.flush()?;
        Ok(())
    }
}

impl Drop for TerminalPreview {
    fn drop(&mut self) {
        let _ = execute!(self.stdout, cursor::Show);
        let _ = writeln!(self.stdout);
    }
}

fn block_level(magnitude: f32, peak: f32) -> usize {
    if peak <= 0.0 {
        return 0;
    }
    ((magnitude / peak * 8.0).round() as usize).min(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_span_the_block_ramp() {
        assert_eq!(block_level(0.0, 1.0), 0);
        assert_eq!(block_level(1.0, 1.0), 8);
        assert_eq!(block_level(0.5, 1.0), 4);
        // Values above the running peak cannot index past the ramp.
        assert_eq!(block_level(2.0, 1.0), 8);
        assert_eq!(block_level(1.0, 0.0), 0);
    }
}
