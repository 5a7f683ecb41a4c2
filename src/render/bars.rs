//! CPU radial bar renderer. Bars radiate from a center circle, with a color
//! gradient around the ring and wider bars toward the middle indices.

/// One RGBA frame, row-major, 4 bytes per pixel. The pixel buffer is fed to
/// the export pipeline verbatim.
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        }
    }

    fn fill(&mut self, color: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    fn put(&mut self, x: i64, y: i64, color: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = ((y as u32 * self.width + x as u32) * 4) as usize;
        self.pixels[idx..idx + 4].copy_from_slice(&color);
    }
}

/// Visual parameters for the ring of bars.
pub struct BarStyle {
    pub min_radius: f32,
    pub height_multiplier: f32,
    pub background: [u8; 3],
    pub color_start: [u8; 3],
    pub color_end: [u8; 3],
}

/// Per-bar geometry and color, precomputed once for a fixed bin count.
pub struct RadialBars {
    directions: Vec<(f32, f32)>,
    colors: Vec<[u8; 4]>,
    widths: Vec<u32>,
    style: BarStyle,
}

impl RadialBars {
    pub fn new(num_bars: usize, style: BarStyle) -> Self {
        let n = num_bars as f32;
        let directions = (0..num_bars)
            .map(|i| {
                let angle = i as f32 / n * 2.0 * std::f32::consts::PI;
                (angle.cos(), angle.sin())
            })
            .collect();

        let colors = (0..num_bars)
            .map(|i| {
                let t = i as f32 / n;
                let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
                [
                    mix(style.color_start[0], style.color_end[0]),
                    mix(style.color_start[1], style.color_end[1]),
                    mix(style.color_start[2], style.color_end[2]),
                    255,
                ]
            })
            .collect();

        // Center-weighted widths: 1px at the ends of the ring, 3px in the
        // middle.
        let widths = (0..num_bars)
            .map(|i| {
                let factor = 1.0 - (i as f32 - n / 2.0).abs() / (n / 2.0);
                (1.0 + factor * 2.0) as u32
            })
            .collect();

        Self {
            directions,
            colors,
            widths,
            style,
        }
    }

    /// Paint one frame: background fill, then one bar per magnitude.
    pub fn draw(&self, magnitudes: &[f32], frame: &mut Frame) {
        let bg = self.style.background;
        frame.fill([bg[0], bg[1], bg[2], 255]);

        let cx = frame.width as f32 / 2.0;
        let cy = frame.height as f32 / 2.0;

        // Anything past the frame diagonal is off-screen; cap the reach so
        // runaway magnitudes stay cheap to draw.
        let reach = (frame.width as f32).hypot(frame.height as f32);

        let n = magnitudes.len().min(self.directions.len());
        for i in 0..n {
            let (dx, dy) = self.directions[i];
            let inner = self.style.min_radius;
            let outer =
                (inner + magnitudes[i] * self.style.height_multiplier).min(reach.max(inner));
            draw_line(
                frame,
                (cx + inner * dx, cy + inner * dy),
                (cx + outer * dx, cy + outer * dy),
                self.widths[i],
                self.colors[i],
            );
        }
    }
}

/// Stamp a `width`-sided square along the segment, clipped at the frame edge.
fn draw_line(frame: &mut Frame, from: (f32, f32), to: (f32, f32), width: u32, color: [u8; 4]) {
    let (x0, y0) = from;
    let (x1, y1) = to;
    let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil() as usize;
    let half = width as i64 / 2;

    for s in 0..=steps {
        let t = if steps == 0 { 0.0 } else { s as f32 / steps as f32 };
        let x = (x0 + (x1 - x0) * t).round() as i64;
        let y = (y0 + (y1 - y0) * t).round() as i64;
        for oy in -half..=half {
            for ox in -half..=half {
                frame.put(x + ox, y + oy, color);
            }
        }
    }
}
