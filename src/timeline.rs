use anyhow::Result;

/// Playback transport read by the live clock once per tick.
pub trait Transport {
    /// Current playback position in seconds.
    fn position(&self) -> f64;
    /// Whether the transport is still producing audio.
    fn is_playing(&self) -> bool;
}

/// Where the analysis instant for each tick comes from.
///
/// Live follows the wall-clock playback position; FixedStep yields exactly
/// `frame_index / fps` so export timing never depends on how long a tick
/// takes to render.
enum Clock {
    Live(Box<dyn Transport>),
    FixedStep { fps: f64, frame_index: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Draining { frames_left: u32 },
    Stopped,
}

/// What the render loop should do this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickPlan {
    /// Analyze this instant, then render and export the result.
    Analyze(f64),
    /// Past end of audio: render the last smoothed state as a tail frame.
    Hold,
    /// Terminal; the loop must exit.
    Stop,
}

/// Per-tick scheduling state machine. Mode is fixed at construction.
pub struct Timeline {
    clock: Clock,
    phase: Phase,
    drain_frames: u32,
    ended: bool,
}

impl Timeline {
    /// Live playback clock. Live runs have no export tail, so end of audio
    /// stops the loop immediately.
    pub fn live(transport: Box<dyn Transport>) -> Self {
        Self {
            clock: Clock::Live(transport),
            phase: Phase::Running,
            drain_frames: 0,
            ended: false,
        }
    }

    /// Deterministic export clock: frame `k` is analyzed at `k / fps`. On end
    /// of audio, `ceil(fps * eos_buffer_seconds)` further tail frames are
    /// produced so the clip does not cut off abruptly.
    pub fn fixed_step(fps: f64, eos_buffer_seconds: f64) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            anyhow::bail!("Export frame rate must be positive (got {})", fps);
        }
        if !(eos_buffer_seconds.is_finite() && eos_buffer_seconds >= 0.0) {
            anyhow::bail!("EOS buffer must be non-negative (got {})", eos_buffer_seconds);
        }
        Ok(Self {
            clock: Clock::FixedStep { fps, frame_index: 0 },
            phase: Phase::Running,
            drain_frames: (fps * eos_buffer_seconds).ceil() as u32,
            ended: false,
        })
    }

    pub fn tick(&mut self) -> TickPlan {
        match &mut self.phase {
            Phase::Running => {
                let instant = match &mut self.clock {
                    Clock::Live(transport) => transport.position(),
                    Clock::FixedStep { fps, frame_index } => {
                        let instant = *frame_index as f64 / *fps;
                        *frame_index += 1;
                        instant
                    }
                };
                TickPlan::Analyze(instant)
            }
            Phase::Draining { frames_left } => {
                if *frames_left == 0 {
                    self.phase = Phase::Stopped;
                    TickPlan::Stop
                } else {
                    *frames_left -= 1;
                    TickPlan::Hold
                }
            }
            Phase::Stopped => TickPlan::Stop,
        }
    }

    /// Report that analysis found no data for the instant this tick asked
    /// about. Fires the end transition exactly once. Returns true when the
    /// current tick should still render a tail frame (it counts against the
    /// drain budget).
    pub fn note_end_of_audio(&mut self) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        self.ended = true;
        if self.drain_frames > 0 {
            self.phase = Phase::Draining {
                frames_left: self.drain_frames - 1,
            };
            true
        } else {
            self.phase = Phase::Stopped;
            false
        }
    }

    /// Live transport drained its queue, e.g. the output device finished
    /// before the clock reached the decoded duration. Always false for the
    /// fixed-step clock.
    pub fn transport_idle(&self) -> bool {
        match &self.clock {
            Clock::Live(transport) => !transport.is_playing(),
            Clock::FixedStep { .. } => false,
        }
    }

    /// Latched once end of audio has been observed; never resets.
    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn stopped(&self) -> bool {
        self.phase == Phase::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeTransport {
        position: Rc<Cell<f64>>,
        playing: Rc<Cell<bool>>,
    }

    impl FakeTransport {
        fn boxed(position: &Rc<Cell<f64>>, playing: &Rc<Cell<bool>>) -> Box<Self> {
            Box::new(Self {
                position: position.clone(),
                playing: playing.clone(),
            })
        }
    }

    impl Transport for FakeTransport {
        fn position(&self) -> f64 {
            self.position.get()
        }
        fn is_playing(&self) -> bool {
            self.playing.get()
        }
    }

    #[test]
    fn fixed_step_instants_are_exact() {
        let mut timeline = Timeline::fixed_step(30.0, 0.0).unwrap();
        for k in 0..300u64 {
            match timeline.tick() {
                TickPlan::Analyze(t) => assert_eq!(t, k as f64 / 30.0),
                other => panic!("expected Analyze, got {:?}", other),
            }
            // Instants depend only on the frame counter, never on elapsed
            // time between ticks.
        }
    }

    #[test]
    fn drain_produces_exactly_the_buffered_frame_count() {
        let mut timeline = Timeline::fixed_step(30.0, 2.0).unwrap();
        assert!(matches!(timeline.tick(), TickPlan::Analyze(_)));

        // Analysis came back empty on that tick.
        let mut tail_frames = 0u32;
        if timeline.note_end_of_audio() {
            tail_frames += 1;
        }
        loop {
            match timeline.tick() {
                TickPlan::Hold => tail_frames += 1,
                TickPlan::Stop => break,
                TickPlan::Analyze(_) => panic!("no analysis after end of audio"),
            }
        }
        assert_eq!(tail_frames, 60);
        assert!(timeline.stopped());
        assert!(timeline.ended());
    }

    #[test]
    fn zero_buffer_stops_without_tail_frames() {
        let mut timeline = Timeline::fixed_step(30.0, 0.0).unwrap();
        timeline.tick();
        assert!(!timeline.note_end_of_audio());
        assert!(timeline.stopped());
        assert_eq!(timeline.tick(), TickPlan::Stop);
    }

    #[test]
    fn live_mode_stops_immediately_at_end() {
        let position = Rc::new(Cell::new(0.0));
        let playing = Rc::new(Cell::new(true));
        let mut timeline = Timeline::live(FakeTransport::boxed(&position, &playing));

        position.set(1.5);
        match timeline.tick() {
            TickPlan::Analyze(t) => assert_eq!(t, 1.5),
            other => panic!("expected Analyze, got {:?}", other),
        }

        // Playback ran past the duration; analyzer reported no data.
        assert!(!timeline.note_end_of_audio());
        assert!(timeline.ended());
        assert_eq!(timeline.tick(), TickPlan::Stop);
    }

    #[test]
    fn ended_stays_latched() {
        let mut timeline = Timeline::fixed_step(10.0, 0.5).unwrap();
        timeline.tick();
        timeline.note_end_of_audio();
        assert!(timeline.ended());
        while timeline.tick() != TickPlan::Stop {}
        assert!(timeline.ended());
        // A second report must not re-arm the drain.
        assert!(!timeline.note_end_of_audio());
        assert_eq!(timeline.tick(), TickPlan::Stop);
    }

    #[test]
    fn drain_count_rounds_up() {
        // 24 fps * 0.1s = 2.4 → 3 tail frames.
        let mut timeline = Timeline::fixed_step(24.0, 0.1).unwrap();
        timeline.tick();
        let mut tail = 0;
        if timeline.note_end_of_audio() {
            tail += 1;
        }
        while timeline.tick() == TickPlan::Hold {
            tail += 1;
        }
        assert_eq!(tail, 3);
    }

    #[test]
    fn transport_idle_tracks_the_sink() {
        let position = Rc::new(Cell::new(0.0));
        let playing = Rc::new(Cell::new(true));
        let timeline = Timeline::live(FakeTransport::boxed(&position, &playing));
        assert!(!timeline.transport_idle());
        playing.set(false);
        assert!(timeline.transport_idle());

        let fixed = Timeline::fixed_step(30.0, 2.0).unwrap();
        assert!(!fixed.transport_idle());
    }

    #[test]
    fn rejects_invalid_rates() {
        assert!(Timeline::fixed_step(0.0, 2.0).is_err());
        assert!(Timeline::fixed_step(f64::NAN, 2.0).is_err());
        assert!(Timeline::fixed_step(30.0, -1.0).is_err());
    }
}
