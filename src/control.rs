//! The slide-to-unlock control: gesture phases in, notifications out.

use std::time::{Duration, Instant};

use log::debug;

use crate::frame::FrameCoalescer;
use crate::gesture::{GestureEvent, GesturePhase};
use crate::observer::{Notification, Notifier, Observer};
use crate::slider::{Slider, SliderSnapshot};
use crate::track::Track;

pub struct Control {
    text: String,
    slider: Slider,
    frames: FrameCoalescer<f32>,
    notifier: Notifier,
}

impl Control {
    pub fn new(text: impl Into<String>, track: Track, threshold: f32, frame: Duration) -> Self {
        Self {
            text: text.into(),
            slider: Slider::new(track, threshold),
            frames: FrameCoalescer::new(frame),
            notifier: Notifier::new(),
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn Observer>) {
        self.notifier.subscribe(observer);
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn slider(&self) -> &Slider {
        &self.slider
    }

    pub fn snapshot(&self) -> SliderSnapshot {
        self.slider.snapshot()
    }

    /// Applies a new threshold and frame interval. Track geometry stays as
    /// measured when the control was created.
    pub fn reconfigure(&mut self, text: &str, threshold: f32, frame: Duration) {
        self.text = text.to_string();
        self.slider.set_threshold(threshold);
        self.frames.set_interval(frame);
    }

    pub fn handle(&mut self, ev: GestureEvent, now: Instant) {
        match ev.phase {
            GesturePhase::Start => {
                self.frames.discard();
                self.slider.start(ev.x);
            }
            GesturePhase::Move => {
                if self.slider.is_dragging() {
                    self.frames.offer(ev.x, now);
                }
            }
            GesturePhase::End => {
                // the release decision uses the freshest coordinate
                if let Some(x) = self.frames.flush() {
                    let moved = self.slider.move_to(x);
                    self.emit(&moved);
                }
                let settled = self.slider.end();
                self.emit(&settled);
            }
        }
    }

    /// Runs the pending move if its frame is due.
    pub fn tick(&mut self, now: Instant) {
        if let Some(x) = self.frames.take_due(now) {
            let moved = self.slider.move_to(x);
            self.emit(&moved);
        }
    }

    pub fn reset(&mut self) {
        self.frames.discard();
        let out = self.slider.reset();
        debug!("control reset");
        self.emit(&out);
    }

    fn emit(&mut self, notifications: &[Notification]) {
        if !notifications.is_empty() {
            self.notifier.emit(notifications);
        }
    }
}
