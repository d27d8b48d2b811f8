//! Per-face liveness tracking via blink cadence and head micro-movement.
//!
//! A static photograph held in front of the camera never blinks and its nose
//! tip never moves more than sensor noise between frames. A live person
//! produces both signals involuntarily within a couple of seconds. This
//! module keeps one small state machine per tracked face slot, advanced once
//! per video frame, and folds the two signals into a single time-decayed
//! "live" verdict: any recognized blink or sufficiently large nose
//! displacement refreshes a liveness window that expires on its own after a
//! configurable timeout.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Printed photographs and other static images.
//! - **Does not block:** Video replay (blinks and motion are present in
//!   video), 3D masks, or adversarial displays.
//!
//! A blink is a closure of at least `consecutive_closed_frames` frames
//! followed by a reopening; the minimum-duration requirement filters
//! single-frame landmark jitter from a true blink. The closure phase is an
//! explicit tagged state rather than a bare counter so the transitions are
//! visible in tests.

use std::time::{Duration, Instant};

use crate::geometry::Point;

/// Tunables for the liveness state machine. All thresholds operate in
/// reduced-frame pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct LivenessConfig {
    /// Eye openness below this counts the frame as "eyes closed".
    pub eye_closed_threshold: f32,
    /// Minimum consecutive closed frames for a closure to count as a blink.
    pub consecutive_closed_frames: u32,
    /// Nose displacement must strictly exceed this to count as motion.
    pub movement_threshold: f32,
    /// How long a refreshed "live" signal lasts. Non-positive values decay
    /// immediately; they are accepted, not rejected.
    pub liveness_timeout_secs: f32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            eye_closed_threshold: 0.24,
            consecutive_closed_frames: 2,
            movement_threshold: 2.5,
            liveness_timeout_secs: 2.0,
        }
    }
}

impl LivenessConfig {
    fn timeout(&self) -> Duration {
        // from_secs_f32 panics on negative input; clamp so a degenerate
        // configuration yields instant expiry instead
        Duration::from_secs_f32(self.liveness_timeout_secs.max(0.0))
    }
}

/// Where the tracker is in the blink cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosurePhase {
    /// Eyes open (or never observed closed); watching for a closure.
    Watching,
    /// Eyes closed for the recorded number of consecutive frames.
    Counting(u32),
}

/// Liveness state for one face slot, persisted across frames.
#[derive(Debug, Clone)]
pub struct SlotState {
    phase: ClosurePhase,
    /// Absolute expiry of the "live" signal; `None` means never refreshed.
    live_until: Option<Instant>,
    last_nose: Option<Point>,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            phase: ClosurePhase::Watching,
            live_until: None,
            last_nose: None,
        }
    }
}

impl SlotState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ClosurePhase {
        self.phase
    }

    /// Advance the state machine by one frame.
    ///
    /// `openness` is `None` when eye geometry was degenerate this frame; the
    /// blink test is then skipped entirely and the closure phase carries over
    /// untouched. The motion test runs regardless, since the nose landmark is
    /// independent of eye geometry.
    pub fn advance(
        &mut self,
        config: &LivenessConfig,
        openness: Option<f32>,
        nose: Point,
        now: Instant,
    ) {
        if let Some(openness) = openness {
            if openness < config.eye_closed_threshold {
                self.phase = match self.phase {
                    ClosurePhase::Watching => ClosurePhase::Counting(1),
                    ClosurePhase::Counting(frames) => ClosurePhase::Counting(frames + 1),
                };
            } else {
                if let ClosurePhase::Counting(frames) = self.phase {
                    if frames >= config.consecutive_closed_frames {
                        tracing::debug!(closed_frames = frames, "blink recognized");
                        self.refresh(config, now);
                    }
                }
                self.phase = ClosurePhase::Watching;
            }
        }

        if let Some(prev) = self.last_nose {
            if nose.distance(&prev) > config.movement_threshold {
                tracing::trace!("head movement recognized");
                self.refresh(config, now);
            }
        }
        self.last_nose = Some(nose);
    }

    /// Whether the live signal has not yet decayed at time `now`.
    pub fn is_live(&self, now: Instant) -> bool {
        self.live_until.is_some_and(|until| now < until)
    }

    /// Push the expiry forward. The window only ever extends: a refresh
    /// never moves `live_until` earlier than a previously granted expiry.
    fn refresh(&mut self, config: &LivenessConfig, now: Instant) {
        let candidate = now + config.timeout();
        self.live_until = Some(match self.live_until {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        });
    }
}
