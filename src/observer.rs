//! Change notifications and the observers that receive them.

use log::{debug, info};
use serde::Serialize;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum Notification {
    Percentage(f32),
    Unlocked(bool),
    /// Gesture finished and settled on this unlocked state.
    Released(bool),
}

pub trait Observer: Send {
    fn percentage_changed(&mut self, percentage: f32);
    fn unlocked_changed(&mut self, unlocked: bool);
    fn released(&mut self, _unlocked: bool) {}
}

/// Fans notifications out to every registered observer, in order.
#[derive(Default)]
pub struct Notifier {
    observers: Vec<Box<dyn Observer>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn emit(&mut self, notifications: &[Notification]) {
        for n in notifications {
            for o in self.observers.iter_mut() {
                match *n {
                    Notification::Percentage(p) => o.percentage_changed(p),
                    Notification::Unlocked(u) => o.unlocked_changed(u),
                    Notification::Released(u) => o.released(u),
                }
            }
        }
    }
}

pub struct LogObserver;

impl Observer for LogObserver {
    fn percentage_changed(&mut self, percentage: f32) {
        debug!("percentage {percentage:.1}");
    }

    fn unlocked_changed(&mut self, unlocked: bool) {
        debug!("unlocked {unlocked}");
    }

    fn released(&mut self, unlocked: bool) {
        info!("released: {}", if unlocked { "unlocked" } else { "locked" });
    }
}

/// Forwards notifications to another thread. A closed channel drops them.
pub struct ChannelObserver {
    tx: Sender<Notification>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<Notification>) -> Self {
        Self { tx }
    }
}

impl Observer for ChannelObserver {
    fn percentage_changed(&mut self, percentage: f32) {
        let _ = self.tx.send(Notification::Percentage(percentage));
    }

    fn unlocked_changed(&mut self, unlocked: bool) {
        let _ = self.tx.send(Notification::Unlocked(unlocked));
    }

    fn released(&mut self, unlocked: bool) {
        let _ = self.tx.send(Notification::Released(unlocked));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn notifier_fans_out_in_order() {
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();
        let mut n = Notifier::new();
        n.subscribe(Box::new(ChannelObserver::new(tx_a)));
        n.subscribe(Box::new(ChannelObserver::new(tx_b)));
        assert_eq!(n.len(), 2);

        let batch = [
            Notification::Percentage(100.0),
            Notification::Unlocked(true),
            Notification::Released(true),
        ];
        n.emit(&batch);

        assert_eq!(rx_a.try_iter().collect::<Vec<_>>(), batch.to_vec());
        assert_eq!(rx_b.try_iter().collect::<Vec<_>>(), batch.to_vec());
    }

    #[test]
    fn closed_channel_is_not_fatal() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut n = Notifier::new();
        n.subscribe(Box::new(ChannelObserver::new(tx)));
        n.emit(&[Notification::Unlocked(false)]);
    }

    #[test]
    fn notifications_serialize_as_tagged_lines() {
        let v = serde_json::to_value(Notification::Percentage(42.0)).unwrap();
        assert_eq!(v, serde_json::json!({"event": "percentage", "value": 42.0}));
        let v = serde_json::to_value(Notification::Released(true)).unwrap();
        assert_eq!(v, serde_json::json!({"event": "released", "value": true}));
    }
}
