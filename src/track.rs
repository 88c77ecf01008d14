//! Track geometry: the bounded region the handle slides along.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_width: f32,
    pub handle_width: f32,
}

impl Track {
    pub fn new(track_width: f32, handle_width: f32) -> Self {
        Self {
            track_width: sanitize(track_width),
            handle_width: sanitize(handle_width),
        }
    }

    /// Geometry that was never measured. Always inert.
    pub fn unmeasured() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Usable range of motion, never negative.
    pub fn travel(&self) -> f32 {
        let t = sanitize(self.track_width) - sanitize(self.handle_width);
        if t > 0.0 { t } else { 0.0 }
    }

    pub fn is_inert(&self) -> bool {
        self.travel() <= 0.0
    }

    /// Whether `x` lands on a handle sitting at `position`.
    pub fn handle_contains(&self, position: f32, x: f32) -> bool {
        x >= position && x <= position + sanitize(self.handle_width)
    }

    pub fn clamp(&self, position: f32) -> f32 {
        if position.is_nan() {
            return 0.0;
        }
        position.clamp(0.0, self.travel())
    }

    /// `position / travel * 100`, or 0 when there is nothing to travel.
    pub fn percentage_of(&self, position: f32) -> f32 {
        let travel = self.travel();
        if travel <= 0.0 {
            return 0.0;
        }
        (self.clamp(position) / travel * 100.0).clamp(0.0, 100.0)
    }
}

// unmeasured layout shows up as NaN, infinities or negatives
fn sanitize(v: f32) -> f32 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}
