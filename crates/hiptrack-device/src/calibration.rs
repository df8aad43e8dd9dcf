//! Guided two-step calibration, driven by the polling loop.
//!
//! A capture settles for a while so the user can get into position, then
//! runs a capture window during which the pose calculator rewrites one
//! rotation in a candidate copy of the offsets. The candidate is handed back
//! only when the window closes; an abort drops it.

use hiptrack_config::CalibrationOffsets;
use hiptrack_pose::CaptureKind;
use std::time::{Duration, Instant};

const FORWARD_PROMPT: &str =
    "Hold your phone in the same direction\nas your VR headset orientation, screen facing up...";
const DOWN_PROMPT: &str =
    "Mount your phone on your hip\nand look straight down at it...";
const HOLD_STILL_PROMPT: &str = "Please stay like that a bit...";

#[derive(Debug, Clone, Copy)]
pub struct CalibrationTiming {
    /// Time given to get into position before capturing.
    pub settle: Duration,
    /// Length of the capture window.
    pub capture: Duration,
}

impl Default for CalibrationTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(7),
            capture: Duration::from_secs(4),
        }
    }
}

/// Host-visible calibration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationState {
    #[default]
    Idle,
    AwaitingForward,
    AwaitingDown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    CaptureStarted(CaptureKind),
    Completed(CaptureKind, CalibrationOffsets),
}

#[derive(Debug, Clone)]
enum Step {
    Idle,
    Settling {
        kind: CaptureKind,
        until: Instant,
    },
    Capturing {
        kind: CaptureKind,
        until: Instant,
        candidate: CalibrationOffsets,
    },
}

#[derive(Debug, Clone)]
pub struct CalibrationSession {
    timing: CalibrationTiming,
    step: Step,
}

impl CalibrationSession {
    pub fn new(timing: CalibrationTiming) -> Self {
        Self {
            timing,
            step: Step::Idle,
        }
    }

    /// Start a capture. Returns false, changing nothing, if one is already running.
    pub fn begin(&mut self, kind: CaptureKind, now: Instant) -> bool {
        if self.is_pending() {
            return false;
        }
        self.step = Step::Settling {
            kind,
            until: now + self.timing.settle,
        };
        true
    }

    /// Move the session along. `offsets` seeds the candidate when a capture window opens.
    pub fn advance(
        &mut self,
        now: Instant,
        offsets: &CalibrationOffsets,
    ) -> Option<CalibrationEvent> {
        match self.step {
            Step::Settling { kind, until } if now >= until => {
                self.step = Step::Capturing {
                    kind,
                    until: now + self.timing.capture,
                    candidate: *offsets,
                };
                Some(CalibrationEvent::CaptureStarted(kind))
            }
            Step::Capturing {
                kind,
                until,
                candidate,
            } if now >= until => {
                self.step = Step::Idle;
                Some(CalibrationEvent::Completed(kind, candidate))
            }
            _ => None,
        }
    }

    /// The running capture and its candidate offsets, while the window is open.
    pub fn capture(&mut self) -> Option<(CaptureKind, &mut CalibrationOffsets)> {
        match &mut self.step {
            Step::Capturing {
                kind, candidate, ..
            } => Some((*kind, candidate)),
            _ => None,
        }
    }

    /// Drop any running capture. Returns whether one was running.
    pub fn abort(&mut self) -> bool {
        let was_pending = self.is_pending();
        self.step = Step::Idle;
        was_pending
    }

    pub fn is_pending(&self) -> bool {
        !matches!(self.step, Step::Idle)
    }

    pub fn state(&self) -> CalibrationState {
        match self.step {
            Step::Idle => CalibrationState::Idle,
            Step::Settling { kind, .. } | Step::Capturing { kind, .. } => match kind {
                CaptureKind::Forward => CalibrationState::AwaitingForward,
                CaptureKind::Down => CalibrationState::AwaitingDown,
            },
        }
    }

    /// What the user should be doing right now.
    pub fn instructions(&self) -> Option<&'static str> {
        match self.step {
            Step::Idle => None,
            Step::Settling {
                kind: CaptureKind::Forward,
                ..
            } => Some(FORWARD_PROMPT),
            Step::Settling {
                kind: CaptureKind::Down,
                ..
            } => Some(DOWN_PROMPT),
            Step::Capturing { .. } => Some(HOLD_STILL_PROMPT),
        }
    }
}

impl Default for CalibrationSession {
    fn default() -> Self {
        Self::new(CalibrationTiming::default())
    }
}
