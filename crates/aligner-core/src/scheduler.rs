use std::time::{Duration, Instant};

use image::imageops::FilterType;

use crate::consts::RENDER_DEBOUNCE_MS;
use crate::transform::Resample;

/// Which of the two render phases is being produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderQuality {
    /// Immediate nearest-neighbour redraw after an input.
    Draft,
    /// Settled redraw with the configured filter.
    Final,
}

impl RenderQuality {
    /// Warp filter for this phase.
    pub fn resample(self, settled: Resample) -> Resample {
        match self {
            Self::Draft => Resample::Nearest,
            Self::Final => settled,
        }
    }

    /// Filter used to scale the visible crop onto the canvas.
    pub fn view_filter(self) -> FilterType {
        match self {
            Self::Draft => FilterType::Nearest,
            Self::Final => FilterType::Triangle,
        }
    }
}

/// Single-shot debounce: every input yields a draft and re-arms one final
/// render `delay` later. Later inputs replace the pending deadline.
#[derive(Clone, Debug)]
pub struct RenderScheduler {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(RENDER_DEBOUNCE_MS))
    }
}

impl RenderScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Register an input at `now`. The caller renders a draft right away.
    pub fn request(&mut self, now: Instant) -> RenderQuality {
        self.deadline = Some(now + self.delay);
        RenderQuality::Draft
    }

    /// `Some(Final)` once the armed deadline has passed; disarms on firing.
    pub fn poll(&mut self, now: Instant) -> Option<RenderQuality> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(RenderQuality::Final)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left until the final render, zero if already due.
    pub fn time_until_final(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}
