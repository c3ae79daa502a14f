//! The seconds-ring animation: one sweep per cue, paced against deadlines.
//!
//! Between cycles the animator sits on the cue gate. On a cue it picks a new
//! target hue and walks every pixel, in order, through `steps_per_pixel`
//! frames, fading that pixel from the previous hue towards the target. By the
//! end of the cycle the whole ring shows the target hue, which becomes the
//! starting hue of the next cycle.
//!
//! Frames are paced with absolute deadlines: each deadline is the previous
//! *deadline* plus one frame period, never "now" plus a period. Time spent
//! rendering a frame therefore never adds up over a cycle. A frame that runs
//! late just makes the next wait shorter (or zero).
//!
//! ## Rust concepts
//! - Generic struct over two traits (`PixelRenderer`, `Clock`)
//! - `Arc<Mutex<T>>` for status shared with the HTTP server, touched only at
//!   cycle boundaries
//! - `Instant` arithmetic (`deadline += period`)

use crate::{LayoutError, RingLayout};
use crate::cue::{CueGate, Wake};
use crate::hue::{Hue, HueGenerator, interpolate};
use crate::pixels::PixelRenderer;
use crate::settings::RingSettings;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Only the first few late frames of a cycle get their own warning.
const MAX_LATE_WARNINGS: u32 = 5;

// ── Clock ────────────────────────────────────────────────────────────

/// Monotonic time source with an absolute-deadline sleep.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block until `deadline`. Returns at once if it has already passed.
    fn sleep_until(&mut self, deadline: Instant);
}

/// The real clock: `Instant::now()` and `thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&mut self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// What the ring is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnimationState {
    /// Waiting for the next cue
    Idle,
    /// Sweeping the ring
    Running,
}

/// Snapshot of the animation, published at the start and end of each cycle.
///
/// The per-frame loop never touches this, so the HTTP server reading it can
/// not delay a frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct AnimationStatus {
    /// Idle or running
    pub state: AnimationState,
    /// Completed cycles since start
    pub cycles: u64,
    /// Hue the current (or last) sweep started from
    pub previous_hue: Hue,
    /// Hue the current (or last) sweep ends on
    pub target_hue: Hue,
    /// Frames that started after their deadline in the last completed cycle
    pub late_frames: u32,
    /// Cues that arrived mid-cycle and were dropped
    pub dropped_cues: u64,
    /// Wall-clock length of the last completed cycle, in milliseconds
    pub last_cycle_ms: u64,
}

impl AnimationStatus {
    pub fn new(hue: Hue) -> Self {
        Self {
            state: AnimationState::Idle,
            cycles: 0,
            previous_hue: hue,
            target_hue: hue,
            late_frames: 0,
            dropped_cues: 0,
            last_cycle_ms: 0,
        }
    }
}

impl Default for AnimationStatus {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Result of one full sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleSummary {
    pub previous_hue: Hue,
    pub target_hue: Hue,
    /// Frames rendered (`RingLayout::frames_per_cycle`)
    pub frames: u32,
    pub late_frames: u32,
    /// From the cue to the last frame, as measured by the clock
    pub elapsed: Duration,
}

// ── Animator ─────────────────────────────────────────────────────────

/// Runs the ring. Owns the renderer for its whole life; nothing else may
/// write pixels.
pub struct RingAnimator<R: PixelRenderer, C: Clock> {
    layout: RingLayout,
    renderer: R,
    clock: C,
    hues: HueGenerator,
    settings: Arc<RingSettings>,
    status: Arc<Mutex<AnimationStatus>>,
    /// Hue the ring shows at rest: the target of the last cycle.
    current_hue: Hue,
}

impl<R: PixelRenderer, C: Clock> RingAnimator<R, C> {
    /// Draws the first hue right away, so the first sweep starts from a
    /// random color rather than from red.
    ///
    /// Fails if the layout can't drive a cycle (see `RingLayout::validate`).
    pub fn new(
        layout: RingLayout,
        renderer: R,
        clock: C,
        mut hues: HueGenerator,
        settings: Arc<RingSettings>,
    ) -> Result<Self, LayoutError> {
        layout.validate()?;

        if renderer.len() != usize::from(layout.ring_size) {
            tracing::warn!(
                "renderer has {} pixels but the layout expects {}",
                renderer.len(),
                layout.ring_size
            );
        }

        let current_hue = hues.next_hue();
        Ok(Self {
            layout,
            renderer,
            clock,
            hues,
            settings,
            status: Arc::new(Mutex::new(AnimationStatus::new(current_hue))),
            current_hue,
        })
    }

    /// Publish status into an existing shared handle (e.g. one the HTTP
    /// server already holds).
    pub fn with_status(mut self, status: Arc<Mutex<AnimationStatus>>) -> Self {
        {
            let mut s = status.lock().unwrap_or_else(|p| p.into_inner());
            *s = AnimationStatus::new(self.current_hue);
        }
        self.status = status;
        self
    }

    pub fn status(&self) -> Arc<Mutex<AnimationStatus>> {
        self.status.clone()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn current_hue(&self) -> Hue {
        self.current_hue
    }

    /// Wait for cues and run one cycle per cue until the gate closes.
    /// Returns the number of cycles run.
    pub fn run(&mut self, gate: &CueGate) -> u64 {
        tracing::info!(
            "seconds ring ready: {} pixels x {} steps, {}ms per frame",
            self.layout.ring_size,
            self.layout.steps_per_pixel,
            self.layout.frame_period().as_millis()
        );

        let mut cycles = 0;
        loop {
            tracing::debug!("waiting for a signal to start");
            if gate.wait_for_signal() == Wake::Closed {
                tracing::info!("cue gate closed, stopping after {} cycles", cycles);
                break;
            }
            tracing::debug!("got the signal, starting!");

            let summary = self.run_cycle();
            cycles += 1;

            // The cycle is meant to finish before the next minute, so a cue
            // that showed up while it ran is stale.
            let dropped = gate.discard_pending();
            if dropped {
                tracing::warn!("a cue arrived while the ring was still sweeping; dropped it");
            }
            self.publish_end(&summary, dropped);
        }
        cycles
    }

    /// Run one full sweep from the current hue to a newly drawn one.
    pub fn run_cycle(&mut self) -> CycleSummary {
        let previous_hue = self.current_hue;
        let target_hue = self.hues.next_hue();
        self.publish_start(previous_hue, target_hue);
        tracing::info!("sweeping from hue {} to {}", previous_hue, target_hue);

        let period = self.layout.frame_period();
        let steps = self.layout.steps_per_pixel;
        let last_pixel = self.layout.ring_size.saturating_sub(1);

        let started = self.clock.now();
        let mut deadline = started;
        let mut frames = 0;
        let mut late_frames = 0;

        for pixel in 0..self.layout.ring_size {
            tracing::debug!("now doing pixel {}", pixel);

            let mut step = 1;
            while step <= steps {
                deadline += period;
                if self.clock.now() > deadline {
                    late_frames += 1;
                    if late_frames <= MAX_LATE_WARNINGS {
                        tracing::warn!(
                            "frame for pixel {} step {} is {}µs late",
                            pixel,
                            step,
                            (self.clock.now() - deadline).as_micros()
                        );
                    }
                }
                self.clock.sleep_until(deadline);

                // Finish the last pixel early to leave slack for the next cue.
                if pixel == last_pixel && step == 1 {
                    step += self.layout.last_pixel_skip;
                }

                let hue = interpolate(previous_hue, target_hue, steps, step);
                let saturation = self.settings.saturation();
                let brightness = self.settings.brightness();
                tracing::trace!(
                    "pixel {} step {}: hue {} sat {} bri {}",
                    pixel,
                    step,
                    hue,
                    saturation,
                    brightness
                );

                self.renderer
                    .set_pixel(usize::from(pixel), hue, saturation, brightness);
                self.renderer.show();

                frames += 1;
                step += 1;
            }
        }

        self.current_hue = target_hue;

        let elapsed = self.clock.now().saturating_duration_since(started);
        if late_frames > 0 {
            tracing::warn!(
                "cycle finished with {} late frames out of {}",
                late_frames,
                frames
            );
        }
        tracing::info!("cycle done in {}ms", elapsed.as_millis());

        CycleSummary {
            previous_hue,
            target_hue,
            frames,
            late_frames,
            elapsed,
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, AnimationStatus> {
        self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish_start(&self, previous_hue: Hue, target_hue: Hue) {
        let mut s = self.lock_status();
        s.state = AnimationState::Running;
        s.previous_hue = previous_hue;
        s.target_hue = target_hue;
    }

    fn publish_end(&self, summary: &CycleSummary, dropped_cue: bool) {
        let mut s = self.lock_status();
        s.state = AnimationState::Idle;
        s.cycles += 1;
        s.late_frames = summary.late_frames;
        s.last_cycle_ms = summary.elapsed.as_millis() as u64;
        if dropped_cue {
            s.dropped_cues += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hue::GOLDEN_RATIO_CONJUGATE;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    // ── Test doubles ───────────────────────────────────────────────

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct SetPixel {
        index: usize,
        hue: Hue,
        saturation: u8,
        brightness: u8,
    }

    type ShowHook = Box<dyn FnMut(usize)>;

    /// Records every call. `on_show` runs after each `show()` with the
    /// running show count, to poke at shared state mid-cycle.
    struct RecordingRenderer {
        len: usize,
        writes: Vec<SetPixel>,
        shows: usize,
        writes_at_show: Vec<usize>,
        on_show: Option<ShowHook>,
    }

    impl RecordingRenderer {
        fn new(len: usize) -> Self {
            Self {
                len,
                writes: Vec::new(),
                shows: 0,
                writes_at_show: Vec::new(),
                on_show: None,
            }
        }

        fn with_hook(mut self, hook: impl FnMut(usize) + 'static) -> Self {
            self.on_show = Some(Box::new(hook));
            self
        }
    }

    impl PixelRenderer for RecordingRenderer {
        fn len(&self) -> usize {
            self.len
        }

        fn set_pixel(&mut self, index: usize, hue: Hue, saturation: u8, brightness: u8) {
            self.writes.push(SetPixel {
                index,
                hue,
                saturation,
                brightness,
            });
        }

        fn show(&mut self) {
            self.shows += 1;
            self.writes_at_show.push(self.writes.len());
            if let Some(hook) = self.on_show.as_mut() {
                hook(self.shows);
            }
        }
    }

    /// Virtual time. `sleep_until` jumps to the deadline, plus an optional
    /// wake-up latency, and remembers every deadline it was given.
    struct VirtualClock {
        now: Instant,
        deadlines: Vec<Instant>,
        wake_latency: Duration,
        /// Extra time lost on the Nth sleep (1-based), to simulate a stall.
        stall: Option<(usize, Duration)>,
    }

    impl VirtualClock {
        fn new() -> Self {
            Self {
                now: Instant::now(),
                deadlines: Vec::new(),
                wake_latency: Duration::ZERO,
                stall: None,
            }
        }
    }

    impl Clock for VirtualClock {
        fn now(&self) -> Instant {
            self.now
        }

        fn sleep_until(&mut self, deadline: Instant) {
            self.deadlines.push(deadline);
            if deadline > self.now {
                self.now = deadline + self.wake_latency;
            }
            if let Some((nth, extra)) = self.stall {
                if nth == self.deadlines.len() {
                    self.now += extra;
                }
            }
        }
    }

    fn small_layout() -> RingLayout {
        // 4 pixels x 5 steps over 200ms: 10ms frames
        RingLayout::new(4, 5, Duration::from_millis(200))
    }

    fn animator(
        layout: RingLayout,
        renderer: RecordingRenderer,
        clock: VirtualClock,
        settings: Arc<RingSettings>,
    ) -> RingAnimator<RecordingRenderer, VirtualClock> {
        RingAnimator::new(layout, renderer, clock, HueGenerator::from_seed(1000), settings)
            .unwrap()
    }

    fn default_settings() -> Arc<RingSettings> {
        Arc::new(RingSettings::new(242, 10))
    }

    // ── Cycle shape ────────────────────────────────────────────────

    #[test]
    fn first_hue_is_drawn_at_construction() {
        let a = animator(
            small_layout(),
            RecordingRenderer::new(4),
            VirtualClock::new(),
            default_settings(),
        );
        assert_eq!(a.current_hue(), 1000 + GOLDEN_RATIO_CONJUGATE);
        assert_eq!(a.status().lock().unwrap().state, AnimationState::Idle);
    }

    #[test]
    fn full_size_cycle_writes_every_pixel_in_order() {
        let layout = RingLayout::default();
        let mut a = animator(
            layout,
            RecordingRenderer::new(60),
            VirtualClock::new(),
            default_settings(),
        );

        let summary = a.run_cycle();
        let r = a.renderer();

        assert_eq!(summary.frames, 60 * 40 - 2);
        assert_eq!(r.writes.len(), 60 * 40 - 2);
        assert_eq!(r.shows, r.writes.len());

        // One write per show, never batched.
        let expected: Vec<usize> = (1..=r.writes.len()).collect();
        assert_eq!(r.writes_at_show, expected);

        // Pixel index never goes backwards and covers 0..60.
        assert!(r.writes.windows(2).all(|w| w[0].index <= w[1].index));
        assert_eq!(r.writes.first().unwrap().index, 0);
        assert_eq!(r.writes.last().unwrap().index, 59);

        for pixel in 0..59 {
            let count = r.writes.iter().filter(|w| w.index == pixel).count();
            assert_eq!(count, 40, "pixel {pixel}");
        }
        assert_eq!(r.writes.iter().filter(|w| w.index == 59).count(), 38);
    }

    #[rstest]
    #[case(small_layout().with_last_pixel_skip(5), LayoutError::SkipTooLarge { skip: 5, steps: 5 })]
    #[case(small_layout().with_last_pixel_skip(9), LayoutError::SkipTooLarge { skip: 9, steps: 5 })]
    #[case(RingLayout::new(0, 5, Duration::from_secs(1)), LayoutError::EmptyRing)]
    #[case(RingLayout::new(4, 0, Duration::from_secs(1)), LayoutError::NoSteps)]
    fn refuses_a_layout_it_cannot_run(#[case] layout: RingLayout, #[case] expected: LayoutError) {
        let result = RingAnimator::new(
            layout,
            RecordingRenderer::new(4),
            VirtualClock::new(),
            HueGenerator::from_seed(1000),
            default_settings(),
        );
        assert_eq!(result.err(), Some(expected));
    }

    #[rstest]
    #[case(0, 20)]
    #[case(1, 19)]
    #[case(3, 17)]
    fn last_pixel_skip_shortens_the_cycle(#[case] skip: u16, #[case] frames: u32) {
        let layout = small_layout().with_last_pixel_skip(skip);
        let mut a = animator(layout, RecordingRenderer::new(4), VirtualClock::new(), default_settings());

        let summary = a.run_cycle();
        assert_eq!(summary.frames, frames);
        assert_eq!(summary.frames, layout.frames_per_cycle());

        // The last pixel resumes right after the skipped steps.
        let last: Vec<Hue> = a
            .renderer()
            .writes
            .iter()
            .filter(|w| w.index == 3)
            .map(|w| w.hue)
            .collect();
        let expected: Vec<Hue> = (1 + skip..=5)
            .map(|step| interpolate(summary.previous_hue, summary.target_hue, 5, step))
            .collect();
        assert_eq!(last, expected);
    }

    #[test]
    fn every_pixel_fades_from_previous_to_target() {
        let mut a = animator(
            small_layout(),
            RecordingRenderer::new(4),
            VirtualClock::new(),
            default_settings(),
        );
        let summary = a.run_cycle();
        assert_eq!(summary.previous_hue, 41503);
        assert_eq!(summary.target_hue, 16470);

        let writes = &a.renderer().writes;
        for pixel in 0..3 {
            let hues: Vec<Hue> = writes
                .iter()
                .filter(|w| w.index == pixel)
                .map(|w| w.hue)
                .collect();
            let expected: Vec<Hue> = (1..=5).map(|s| interpolate(41503, 16470, 5, s)).collect();
            assert_eq!(hues, expected);
        }
        // (16470 - 41503) / 5 = -5006 (truncated), so the end is 41503 - 25030
        assert_eq!(writes.last().unwrap().hue, 16473);
    }

    #[test]
    fn next_cycle_starts_from_previous_target() {
        let mut a = animator(
            small_layout(),
            RecordingRenderer::new(4),
            VirtualClock::new(),
            default_settings(),
        );
        let first = a.run_cycle();
        let second = a.run_cycle();

        assert_eq!(second.previous_hue, first.target_hue);
        assert_eq!(a.current_hue(), second.target_hue);

        let first_write_of_second = a.renderer().writes[first.frames as usize];
        assert_eq!(
            first_write_of_second.hue,
            interpolate(first.target_hue, second.target_hue, 5, 1)
        );
    }

    #[test]
    fn equal_hues_render_a_constant_color() {
        let layout = small_layout();
        let mut a = RingAnimator::new(
            layout,
            RecordingRenderer::new(4),
            VirtualClock::new(),
            HueGenerator::from_seed(1000),
            default_settings(),
        )
        .unwrap();
        // Force a tie by rewinding the generator onto the current hue.
        a.hues = HueGenerator::from_seed(a.current_hue.wrapping_sub(GOLDEN_RATIO_CONJUGATE));

        let summary = a.run_cycle();
        assert_eq!(summary.previous_hue, summary.target_hue);
        assert!(a.renderer().writes.iter().all(|w| w.hue == summary.target_hue));
    }

    // ── Settings ───────────────────────────────────────────────────

    #[test]
    fn every_frame_uses_current_settings() {
        let mut a = animator(
            small_layout(),
            RecordingRenderer::new(4),
            VirtualClock::new(),
            default_settings(),
        );
        a.run_cycle();
        assert!(
            a.renderer()
                .writes
                .iter()
                .all(|w| w.saturation == 242 && w.brightness == 10)
        );
    }

    #[test]
    fn settings_changed_mid_cycle_apply_to_the_next_frame() {
        let settings = default_settings();
        let writer = settings.clone();
        let renderer = RecordingRenderer::new(4).with_hook(move |shows| {
            if shows == 7 {
                writer.set_brightness(200).unwrap();
                writer.set_saturation(50).unwrap();
            }
        });

        let mut a = animator(small_layout(), renderer, VirtualClock::new(), settings);
        a.run_cycle();

        let writes = &a.renderer().writes;
        assert!(writes[..7].iter().all(|w| w.brightness == 10 && w.saturation == 242));
        assert!(writes[7..].iter().all(|w| w.brightness == 200 && w.saturation == 50));
    }

    // ── Pacing ─────────────────────────────────────────────────────

    #[test]
    fn deadlines_are_absolute() {
        let mut clock = VirtualClock::new();
        clock.wake_latency = Duration::from_millis(3);
        let start = clock.now;

        let mut a = animator(small_layout(), RecordingRenderer::new(4), clock, default_settings());
        let summary = a.run_cycle();

        let period = Duration::from_millis(10);
        let expected: Vec<Instant> = (1..=summary.frames).map(|k| start + period * k).collect();
        assert_eq!(a.clock.deadlines, expected);

        // Wake-up latency does not pile up: the cycle is one latency late,
        // not one per frame.
        assert_eq!(summary.elapsed, period * summary.frames + Duration::from_millis(3));
        assert_eq!(summary.late_frames, 0);
    }

    #[test]
    fn stall_is_absorbed_without_shifting_later_deadlines() {
        let mut clock = VirtualClock::new();
        clock.stall = Some((2, Duration::from_millis(35)));
        let start = clock.now;

        let mut a = animator(small_layout(), RecordingRenderer::new(4), clock, default_settings());
        let summary = a.run_cycle();

        // After frame 2 the clock sits at 55ms, so deadlines 30, 40 and 50ms
        // have already passed.
        assert_eq!(summary.late_frames, 3);
        let period = Duration::from_millis(10);
        assert_eq!(*a.clock.deadlines.last().unwrap(), start + period * summary.frames);
        assert_eq!(summary.elapsed, period * summary.frames);
    }

    #[test]
    fn frame_period_divides_the_cycle() {
        let layout = RingLayout::default();
        let mut a = animator(layout, RecordingRenderer::new(60), VirtualClock::new(), default_settings());
        let summary = a.run_cycle();

        // 2398 frames of 25ms: the cycle ends 50ms before the minute is up.
        assert_eq!(summary.elapsed, Duration::from_millis(59_950));
        assert!(summary.elapsed < layout.cycle);
    }

    // ── Cue handling ───────────────────────────────────────────────

    #[test]
    fn coalesced_cues_run_one_cycle() {
        let gate = CueGate::new();
        gate.signal();
        gate.signal();
        gate.close();

        let mut a = animator(
            small_layout(),
            RecordingRenderer::new(4),
            VirtualClock::new(),
            default_settings(),
        );
        assert_eq!(a.run(&gate), 1);
        assert_eq!(a.renderer().shows, 20 - 2);
    }

    #[test]
    fn closed_gate_runs_nothing() {
        let gate = CueGate::new();
        gate.close();

        let mut a = animator(
            small_layout(),
            RecordingRenderer::new(4),
            VirtualClock::new(),
            default_settings(),
        );
        assert_eq!(a.run(&gate), 0);
        assert!(a.renderer().writes.is_empty());
    }

    #[test]
    fn cue_during_a_cycle_is_dropped() {
        let gate = Arc::new(CueGate::new());
        gate.signal();
        gate.close();

        let producer = gate.clone();
        let renderer = RecordingRenderer::new(4).with_hook(move |shows| {
            if shows == 5 {
                producer.signal();
            }
        });

        let mut a = animator(small_layout(), renderer, VirtualClock::new(), default_settings());
        assert_eq!(a.run(&gate), 1);

        let status = a.status().lock().unwrap().clone();
        assert_eq!(status.dropped_cues, 1);
        assert_eq!(status.cycles, 1);
    }

    #[test]
    fn status_tracks_cycles() {
        let shared = Arc::new(Mutex::new(AnimationStatus::default()));
        let gate = CueGate::new();
        gate.signal();
        gate.close();

        let observed = Arc::new(Mutex::new(None));
        let seen = observed.clone();
        let probe = shared.clone();
        let renderer = RecordingRenderer::new(4).with_hook(move |shows| {
            if shows == 1 {
                *seen.lock().unwrap() = Some(probe.lock().unwrap().state);
            }
        });

        let mut a = animator(small_layout(), renderer, VirtualClock::new(), default_settings())
            .with_status(shared.clone());
        a.run(&gate);

        assert_eq!(*observed.lock().unwrap(), Some(AnimationState::Running));

        let status = shared.lock().unwrap().clone();
        assert_eq!(
            status,
            AnimationStatus {
                state: AnimationState::Idle,
                cycles: 1,
                previous_hue: 41503,
                target_hue: 16470,
                late_frames: 0,
                dropped_cues: 0,
                last_cycle_ms: 180,
            }
        );
    }

    #[test]
    fn system_clock_sleeps_until_deadline() {
        let mut clock = SystemClock;
        let deadline = clock.now() + Duration::from_millis(15);
        clock.sleep_until(deadline);
        assert!(clock.now() >= deadline);

        // A passed deadline returns straight away.
        let before = clock.now();
        clock.sleep_until(before - Duration::from_millis(5));
        assert!(clock.now() - before < Duration::from_millis(5));
    }
}
