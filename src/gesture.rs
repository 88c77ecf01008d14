//! Input normalization: raw device events to single-axis gesture phases.
//!
//! Both adapters consume [`RawEvent`]s and emit at most one
//! [`GestureEvent`] per input frame (on `Sync`). Downstream code only ever
//! sees `Start`/`Move`/`End` with an X coordinate in track pixels.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Start,
    Move,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureEvent {
    pub phase: GesturePhase,
    pub x: f32,
}

impl GestureEvent {
    pub fn start(x: f32) -> Self {
        Self { phase: GesturePhase::Start, x }
    }
    pub fn moved(x: f32) -> Self {
        Self { phase: GesturePhase::Move, x }
    }
    pub fn end(x: f32) -> Self {
        Self { phase: GesturePhase::End, x }
    }
}

/// Device events the adapters understand. Everything else is dropped by
/// the decoder before it gets here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    TouchSlot(i32),
    TouchTrackingId(i32),
    TouchX(i32),
    PointerButton(bool),
    PointerRelX(i32),
    /// End of an input frame (SYN_REPORT).
    Sync,
    /// Events were lost or the device went away; acts as a cancel.
    Dropped,
}

pub trait GestureAdapter: Send {
    fn feed(&mut self, ev: RawEvent) -> Option<GestureEvent>;
    /// True between an emitted `Start` and the matching `End`.
    fn is_active(&self) -> bool;
    fn name(&self) -> &'static str;
}

// ---------------- touch ----------------

/// Follows the first contact of a multitouch device. Additional contacts
/// are ignored until the tracked one lifts.
#[derive(Debug)]
pub struct TouchAdapter {
    axis_min: i32,
    axis_max: i32,
    span_px: f32,
    cur_slot: i32,
    tracked: Option<i32>,
    xs: HashMap<i32, f32>,
    down_pending: bool,
    up_pending: bool,
    moved: bool,
    active: bool,
}

impl TouchAdapter {
    pub fn new(axis_min: i32, axis_max: i32, span_px: f32) -> Self {
        Self {
            axis_min,
            axis_max: axis_max.max(axis_min + 1),
            span_px: if span_px.is_finite() { span_px.max(0.0) } else { 0.0 },
            cur_slot: 0,
            tracked: None,
            xs: HashMap::new(),
            down_pending: false,
            up_pending: false,
            moved: false,
            active: false,
        }
    }

    fn to_px(&self, raw: i32) -> f32 {
        let n = ((raw - self.axis_min) as f32 / (self.axis_max - self.axis_min) as f32)
            .clamp(0.0, 1.0);
        n * self.span_px
    }

    fn tracked_x(&self) -> f32 {
        self.tracked
            .and_then(|s| self.xs.get(&s).copied())
            .unwrap_or(0.0)
    }

    fn clear(&mut self) {
        self.tracked = None;
        self.down_pending = false;
        self.up_pending = false;
        self.moved = false;
        self.active = false;
    }
}

impl GestureAdapter for TouchAdapter {
    fn feed(&mut self, ev: RawEvent) -> Option<GestureEvent> {
        match ev {
            RawEvent::TouchSlot(slot) => {
                self.cur_slot = slot.max(0);
                None
            }
            RawEvent::TouchTrackingId(id) => {
                if id >= 0 {
                    if self.tracked.is_none() {
                        self.tracked = Some(self.cur_slot);
                        self.down_pending = true;
                    }
                } else if self.tracked == Some(self.cur_slot) {
                    self.up_pending = true;
                }
                None
            }
            RawEvent::TouchX(raw) => {
                let px = self.to_px(raw);
                self.xs.insert(self.cur_slot, px);
                if self.tracked == Some(self.cur_slot) {
                    self.moved = true;
                }
                None
            }
            RawEvent::Sync => {
                let x = self.tracked_x();
                if self.down_pending && self.up_pending {
                    // contact came and went inside one frame
                    self.clear();
                    None
                } else if self.down_pending {
                    self.down_pending = false;
                    self.moved = false;
                    self.active = true;
                    Some(GestureEvent::start(x))
                } else if self.up_pending {
                    let was_active = self.active;
                    self.clear();
                    was_active.then(|| GestureEvent::end(x))
                } else if self.moved && self.active {
                    self.moved = false;
                    Some(GestureEvent::moved(x))
                } else {
                    self.moved = false;
                    None
                }
            }
            RawEvent::Dropped => {
                let x = self.tracked_x();
                let was_active = self.active;
                self.clear();
                was_active.then(|| GestureEvent::end(x))
            }
            RawEvent::PointerButton(_) | RawEvent::PointerRelX(_) => None,
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn name(&self) -> &'static str {
        "touch"
    }
}

// ---------------- pointer ----------------

/// Relative pointer (mouse, trackpad in mouse mode). Motion accumulates
/// into a virtual cursor; only motion with the left button held counts.
#[derive(Debug)]
pub struct PointerAdapter {
    gain: f32,
    cursor: f32,
    pressed: bool,
    press_pending: bool,
    release_pending: bool,
    moved: bool,
    active: bool,
}

impl PointerAdapter {
    pub fn new(gain: f32) -> Self {
        Self {
            gain: if gain.is_finite() && gain > 0.0 { gain } else { 1.0 },
            cursor: 0.0,
            pressed: false,
            press_pending: false,
            release_pending: false,
            moved: false,
            active: false,
        }
    }

    pub fn cursor(&self) -> f32 {
        self.cursor
    }
}

impl GestureAdapter for PointerAdapter {
    fn feed(&mut self, ev: RawEvent) -> Option<GestureEvent> {
        match ev {
            RawEvent::PointerButton(down) => {
                if down && !self.pressed {
                    self.pressed = true;
                    self.press_pending = true;
                } else if !down && self.pressed {
                    self.pressed = false;
                    self.release_pending = true;
                }
                None
            }
            RawEvent::PointerRelX(dx) => {
                self.cursor += dx as f32 * self.gain;
                if self.pressed || self.active {
                    self.moved = true;
                }
                None
            }
            RawEvent::Sync => {
                let x = self.cursor;
                if self.press_pending && self.release_pending {
                    self.press_pending = false;
                    self.release_pending = false;
                    self.moved = false;
                    None
                } else if self.press_pending {
                    self.press_pending = false;
                    self.moved = false;
                    self.active = true;
                    Some(GestureEvent::start(x))
                } else if self.release_pending {
                    self.release_pending = false;
                    self.moved = false;
                    let was_active = std::mem::replace(&mut self.active, false);
                    was_active.then(|| GestureEvent::end(x))
                } else if self.moved && self.active {
                    self.moved = false;
                    Some(GestureEvent::moved(x))
                } else {
                    self.moved = false;
                    None
                }
            }
            RawEvent::Dropped => {
                self.pressed = false;
                self.press_pending = false;
                self.release_pending = false;
                self.moved = false;
                let was_active = std::mem::replace(&mut self.active, false);
                was_active.then(|| GestureEvent::end(self.cursor))
            }
            RawEvent::TouchSlot(_) | RawEvent::TouchTrackingId(_) | RawEvent::TouchX(_) => None,
        }
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn name(&self) -> &'static str {
        "pointer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(a: &mut dyn GestureAdapter, evs: &[RawEvent]) -> Vec<GestureEvent> {
        evs.iter().filter_map(|e| a.feed(*e)).collect()
    }

    fn touch() -> TouchAdapter {
        // 0..=1000 device units onto a 300px track
        TouchAdapter::new(0, 1000, 300.0)
    }

    #[test]
    fn touch_down_move_up() {
        let mut a = touch();
        let out = feed_all(
            &mut a,
            &[
                RawEvent::TouchSlot(0),
                RawEvent::TouchTrackingId(7),
                RawEvent::TouchX(100),
                RawEvent::Sync,
                RawEvent::TouchX(500),
                RawEvent::Sync,
                RawEvent::TouchTrackingId(-1),
                RawEvent::Sync,
            ],
        );
        assert_eq!(
            out,
            vec![
                GestureEvent::start(30.0),
                GestureEvent::moved(150.0),
                GestureEvent::end(150.0),
            ]
        );
        assert!(!a.is_active());
    }

    #[test]
    fn second_contact_is_ignored() {
        let mut a = touch();
        let out = feed_all(
            &mut a,
            &[
                RawEvent::TouchTrackingId(1),
                RawEvent::TouchX(0),
                RawEvent::Sync,
                RawEvent::TouchSlot(1),
                RawEvent::TouchTrackingId(2),
                RawEvent::TouchX(900),
                RawEvent::Sync,
                RawEvent::TouchTrackingId(-1),
                RawEvent::Sync,
            ],
        );
        assert_eq!(out, vec![GestureEvent::start(0.0)]);
        assert!(a.is_active());
    }

    #[test]
    fn touch_motion_without_contact_is_ignored() {
        let mut a = touch();
        let out = feed_all(&mut a, &[RawEvent::TouchX(300), RawEvent::Sync]);
        assert!(out.is_empty());
    }

    #[test]
    fn dropped_events_cancel_active_touch() {
        let mut a = touch();
        let out = feed_all(
            &mut a,
            &[
                RawEvent::TouchTrackingId(3),
                RawEvent::TouchX(200),
                RawEvent::Sync,
                RawEvent::Dropped,
            ],
        );
        assert_eq!(out, vec![GestureEvent::start(60.0), GestureEvent::end(60.0)]);
        assert!(!a.is_active());
        assert_eq!(a.feed(RawEvent::Dropped), None);
    }

    #[test]
    fn pointer_press_drag_release() {
        let mut a = PointerAdapter::new(1.0);
        let out = feed_all(
            &mut a,
            &[
                RawEvent::PointerRelX(40),
                RawEvent::Sync,
                RawEvent::PointerButton(true),
                RawEvent::Sync,
                RawEvent::PointerRelX(10),
                RawEvent::Sync,
                RawEvent::PointerRelX(15),
                RawEvent::Sync,
                RawEvent::PointerButton(false),
                RawEvent::Sync,
            ],
        );
        assert_eq!(
            out,
            vec![
                GestureEvent::start(40.0),
                GestureEvent::moved(50.0),
                GestureEvent::moved(65.0),
                GestureEvent::end(65.0),
            ]
        );
    }

    #[test]
    fn pointer_motion_without_button_is_ignored() {
        let mut a = PointerAdapter::new(2.0);
        let out = feed_all(&mut a, &[RawEvent::PointerRelX(5), RawEvent::Sync]);
        assert!(out.is_empty());
        assert_eq!(a.cursor(), 10.0);
    }

    #[test]
    fn pointer_device_loss_ends_gesture() {
        let mut a = PointerAdapter::new(1.0);
        feed_all(&mut a, &[RawEvent::PointerButton(true), RawEvent::Sync]);
        assert!(a.is_active());
        assert_eq!(a.feed(RawEvent::Dropped), Some(GestureEvent::end(0.0)));
        assert!(!a.is_active());
    }

    #[test]
    fn adapters_ignore_the_other_source() {
        let mut t = touch();
        assert_eq!(t.feed(RawEvent::PointerButton(true)), None);
        assert_eq!(t.feed(RawEvent::Sync), None);
        let mut p = PointerAdapter::new(1.0);
        assert_eq!(p.feed(RawEvent::TouchTrackingId(1)), None);
        assert_eq!(p.feed(RawEvent::Sync), None);
    }
}
