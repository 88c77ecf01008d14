//! Drag state machine for the slide-to-unlock handle.
//!
//! `Slider` owns the handle position, the percentage derived from it and the
//! committed ("unlocked") flag. It never looks at raw input; callers feed it
//! already-normalized coordinates through [`Slider::start`],
//! [`Slider::move_to`] and [`Slider::end`].

use log::debug;
use serde::Serialize;

use crate::observer::Notification;
use crate::track::Track;

pub const DEFAULT_THRESHOLD: f32 = 0.85;

/// State that only exists between gesture start and gesture end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    /// Input coordinate minus handle position at gesture start.
    pub start_offset: f32,
}

/// Point-in-time view of the control, for renderers and `status`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SliderSnapshot {
    pub position: f32,
    pub travel: f32,
    pub percentage: f32,
    pub display_percentage: u8,
    pub unlocked: bool,
    pub dragging: bool,
    pub transition: bool,
}

#[derive(Debug, Clone)]
pub struct Slider {
    track: Track,
    threshold: f32,
    position: f32,
    percentage: f32,
    committed: bool,
    session: Option<DragSession>,
}

impl Slider {
    pub fn new(track: Track, threshold: f32) -> Self {
        Self {
            track,
            threshold: sanitize_threshold(threshold),
            position: 0.0,
            percentage: 0.0,
            committed: false,
            session: None,
        }
    }

    pub fn track(&self) -> Track {
        self.track
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = sanitize_threshold(threshold);
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn percentage(&self) -> f32 {
        self.percentage
    }

    pub fn is_unlocked(&self) -> bool {
        self.committed
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<DragSession> {
        self.session
    }

    /// Snap-back transition styling is on whenever no drag is held.
    pub fn transition_enabled(&self) -> bool {
        self.session.is_none()
    }

    /// Position at which a release commits.
    pub fn commit_boundary(&self) -> f32 {
        self.threshold * self.track.travel()
    }

    // An inert track (travel == 0) never commits.
    fn crosses_threshold(&self) -> bool {
        let travel = self.track.travel();
        travel > 0.0 && self.position >= self.threshold * travel
    }

    /// Opens a drag session. Presses that miss the handle are ignored.
    pub fn start(&mut self, coordinate: f32) {
        if !coordinate.is_finite() {
            return;
        }
        if !self.track.handle_contains(self.position, coordinate) {
            debug!("press at {coordinate} missed the handle at {}", self.position);
            return;
        }
        let start_offset = coordinate - self.position;
        debug!("drag start at {coordinate} (offset {start_offset})");
        self.session = Some(DragSession { start_offset });
    }

    /// Moves the handle relative to the session origin. Ignored while idle.
    pub fn move_to(&mut self, coordinate: f32) -> Vec<Notification> {
        let Some(session) = self.session else {
            return Vec::new();
        };
        if !coordinate.is_finite() {
            return Vec::new();
        }

        self.position = self.track.clamp(coordinate - session.start_offset);
        self.percentage = self.track.percentage_of(self.position);

        let mut out = vec![Notification::Percentage(self.percentage)];
        let live = self.crosses_threshold();
        if live != self.committed {
            self.committed = live;
            out.push(Notification::Unlocked(live));
        }
        out
    }

    /// Finalizes the gesture: snap to the end of the track when past the
    /// threshold, otherwise back to the start. No-op while idle.
    pub fn end(&mut self) -> Vec<Notification> {
        if self.session.take().is_none() {
            return Vec::new();
        }

        let unlocked = self.crosses_threshold();
        if unlocked {
            self.position = self.track.travel();
            self.percentage = 100.0;
        } else {
            self.position = 0.0;
            self.percentage = 0.0;
        }
        self.committed = unlocked;
        debug!("drag end: unlocked={unlocked}");

        vec![
            Notification::Percentage(self.percentage),
            Notification::Unlocked(self.committed),
            Notification::Released(unlocked),
        ]
    }

    /// Back to the locked rest position. Leaves any active session alone.
    pub fn reset(&mut self) -> Vec<Notification> {
        self.position = 0.0;
        self.percentage = 0.0;
        self.committed = false;
        vec![
            Notification::Unlocked(false),
            Notification::Percentage(0.0),
        ]
    }

    pub fn snapshot(&self) -> SliderSnapshot {
        SliderSnapshot {
            position: self.position,
            travel: self.track.travel(),
            percentage: self.percentage,
            display_percentage: self.percentage.round().clamp(0.0, 100.0) as u8,
            unlocked: self.committed,
            dragging: self.is_dragging(),
            transition: self.transition_enabled(),
        }
    }
}

fn sanitize_threshold(t: f32) -> f32 {
    if t.is_finite() && t > 0.0 && t <= 1.0 {
        t
    } else {
        DEFAULT_THRESHOLD
    }
}
