//! Input device discovery, source selection and the device attachment
//! (evdev 0.13.2 compatible)

use anyhow::{Result, anyhow};
use evdev::{
    AbsoluteAxisCode, Device, EventType, InputEvent, KeyCode, RelativeAxisCode,
    SynchronizationCode,
};
use log::{info, warn};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::config::{Profile, SourcePreference};
use crate::gesture::{GestureAdapter, GestureEvent, PointerAdapter, RawEvent, TouchAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Touch,
    Pointer,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Touch => "touch",
            SourceKind::Pointer => "pointer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub kind: SourceKind,
    /// Raw ABS_MT_POSITION_X range; touch devices only.
    pub x_range: Option<(i32, i32)>,
}

impl DeviceInfo {
    pub fn describe(&self) -> String {
        format!("{} [{}] ({})", self.name, self.kind.as_str(), self.path.display())
    }
}

fn classify(dev: &Device) -> Option<SourceKind> {
    let has_mt = dev.supported_events().contains(EventType::ABSOLUTE)
        && dev.supported_absolute_axes().is_some_and(|a| {
            a.contains(AbsoluteAxisCode::ABS_MT_SLOT)
                && a.contains(AbsoluteAxisCode::ABS_MT_POSITION_X)
        });
    if has_mt {
        return Some(SourceKind::Touch);
    }
    let has_rel_x = dev
        .supported_relative_axes()
        .is_some_and(|a| a.contains(RelativeAxisCode::REL_X));
    let has_left = dev
        .supported_keys()
        .is_some_and(|k| k.contains(KeyCode::BTN_LEFT));
    (has_rel_x && has_left).then_some(SourceKind::Pointer)
}

fn x_range(dev: &Device) -> Option<(i32, i32)> {
    dev.get_absinfo()
        .ok()?
        .find(|(code, _)| *code == AbsoluteAxisCode::ABS_MT_POSITION_X)
        .map(|(_, info)| (info.minimum(), info.maximum()))
}

fn probe(path: &Path) -> Option<DeviceInfo> {
    let dev = Device::open(path).ok()?;
    let kind = classify(&dev)?;
    Some(DeviceInfo {
        path: path.to_path_buf(),
        name: dev.name().unwrap_or("unknown").to_string(),
        kind,
        x_range: if kind == SourceKind::Touch { x_range(&dev) } else { None },
    })
}

/// Touch and pointer devices under /dev/input, or just `only` when given.
pub fn discover(only: Option<&Path>) -> Vec<DeviceInfo> {
    if let Some(p) = only {
        return probe(p).into_iter().collect();
    }
    let mut out = vec![];
    if let Ok(rd) = fs::read_dir("/dev/input") {
        for e in rd.flatten() {
            let p = e.path();
            let is_event_node = p
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.starts_with("event"));
            if is_event_node {
                if let Some(info) = probe(&p) {
                    out.push(info);
                }
            }
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// Picks the one source to listen to. `Auto` prefers touch; touch and
/// pointer are never attached together.
pub fn select_source(pref: SourcePreference, devices: &[DeviceInfo]) -> Option<SourceKind> {
    let has = |k: SourceKind| devices.iter().any(|d| d.kind == k);
    match pref {
        SourcePreference::Touch => has(SourceKind::Touch).then_some(SourceKind::Touch),
        SourcePreference::Pointer => has(SourceKind::Pointer).then_some(SourceKind::Pointer),
        SourcePreference::Auto => {
            if has(SourceKind::Touch) {
                Some(SourceKind::Touch)
            } else if has(SourceKind::Pointer) {
                Some(SourceKind::Pointer)
            } else {
                None
            }
        }
    }
}

pub fn make_adapter(
    kind: SourceKind,
    devices: &[DeviceInfo],
    profile: &Profile,
) -> Box<dyn GestureAdapter> {
    match kind {
        SourceKind::Touch => {
            let (min, max) = devices
                .iter()
                .find(|d| d.kind == SourceKind::Touch)
                .and_then(|d| d.x_range)
                .unwrap_or((0, 4096));
            // the full panel width maps onto the track
            Box::new(TouchAdapter::new(min, max, profile.track.track_width))
        }
        SourceKind::Pointer => Box::new(PointerAdapter::new(profile.input.pointer_gain)),
    }
}

/// Maps one evdev event onto what the adapters consume.
pub fn decode(ev: &InputEvent) -> Option<RawEvent> {
    decode_parts(ev.event_type(), ev.code(), ev.value())
}

pub fn decode_parts(ty: EventType, code: u16, value: i32) -> Option<RawEvent> {
    if ty == EventType::ABSOLUTE {
        match code {
            c if c == AbsoluteAxisCode::ABS_MT_SLOT.0 => Some(RawEvent::TouchSlot(value)),
            c if c == AbsoluteAxisCode::ABS_MT_TRACKING_ID.0 => {
                Some(RawEvent::TouchTrackingId(value))
            }
            c if c == AbsoluteAxisCode::ABS_MT_POSITION_X.0 => Some(RawEvent::TouchX(value)),
            _ => None,
        }
    } else if ty == EventType::RELATIVE {
        (code == RelativeAxisCode::REL_X.0).then_some(RawEvent::PointerRelX(value))
    } else if ty == EventType::KEY {
        // value 2 is autorepeat
        (code == KeyCode::BTN_LEFT.0 && value != 2).then_some(RawEvent::PointerButton(value == 1))
    } else if ty == EventType::SYNCHRONIZATION {
        match code {
            c if c == SynchronizationCode::SYN_REPORT.0 => Some(RawEvent::Sync),
            c if c == SynchronizationCode::SYN_DROPPED.0 => Some(RawEvent::Dropped),
            _ => None,
        }
    } else {
        None
    }
}

/// One opened input node, as the attachment drives it.
pub trait EventSource {
    /// Appends whatever decoded events are pending. `WouldBlock` means none.
    fn read_into(&mut self, out: &mut Vec<RawEvent>) -> io::Result<()>;
    fn grab(&mut self) -> io::Result<()>;
    fn ungrab(&mut self) -> io::Result<()>;
}

impl EventSource for Device {
    fn read_into(&mut self, out: &mut Vec<RawEvent>) -> io::Result<()> {
        out.extend(self.fetch_events()?.filter_map(|ev| decode(&ev)));
        Ok(())
    }

    fn grab(&mut self) -> io::Result<()> {
        Device::grab(self)
    }

    fn ungrab(&mut self) -> io::Result<()> {
        Device::ungrab(self)
    }
}

/// Index of a device within its attachment; stable for the attachment's life.
pub type DeviceId = usize;

struct Attached {
    id: DeviceId,
    path: PathBuf,
    source: Box<dyn EventSource>,
}

/// Open handles on the selected devices. With `exclusive`, every device is
/// grabbed as soon as it is attached and stays grabbed until this is dropped,
/// so no press or release is ever split between slidectl and the desktop.
pub struct InputAttachment {
    devices: Vec<Attached>,
    grabbed: bool,
    scratch: Vec<RawEvent>,
}

impl InputAttachment {
    pub fn attach(kind: SourceKind, devices: &[DeviceInfo], exclusive: bool) -> Result<Self> {
        let mut opened: Vec<(PathBuf, Box<dyn EventSource>)> = vec![];
        for d in devices.iter().filter(|d| d.kind == kind) {
            match Device::open(&d.path) {
                Ok(mut dev) => {
                    if let Err(e) = dev.set_nonblocking(true) {
                        warn!("failed to set {} nonblocking: {e}", d.path.display());
                        continue;
                    }
                    info!("attached {}", d.describe());
                    opened.push((d.path.clone(), Box::new(dev)));
                }
                Err(e) => warn!("failed to open {}: {e}", d.path.display()),
            }
        }
        if opened.is_empty() {
            return Err(anyhow!("no {} device could be opened", kind.as_str()));
        }
        Ok(Self::from_sources(opened, exclusive))
    }

    pub fn from_sources(sources: Vec<(PathBuf, Box<dyn EventSource>)>, exclusive: bool) -> Self {
        let devices = sources
            .into_iter()
            .enumerate()
            .map(|(id, (path, source))| Attached { id, path, source })
            .collect();
        let mut att = Self {
            devices,
            grabbed: false,
            scratch: Vec::new(),
        };
        if exclusive {
            att.grab_all();
        }
        att
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    /// Drains pending events into `out`, tagged with the device they came
    /// from. A device that fails with anything but WouldBlock is detached and
    /// reported as its own `Dropped`.
    pub fn fetch(&mut self, out: &mut Vec<(DeviceId, RawEvent)>) {
        let scratch = &mut self.scratch;
        self.devices.retain_mut(|d| {
            scratch.clear();
            let r = d.source.read_into(scratch);
            out.extend(scratch.drain(..).map(|ev| (d.id, ev)));
            match r {
                Ok(()) => true,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
                Err(e) => {
                    warn!("lost {}: {e}", d.path.display());
                    out.push((d.id, RawEvent::Dropped));
                    false
                }
            }
        });
    }

    fn grab_all(&mut self) {
        for d in self.devices.iter_mut() {
            if let Err(e) = d.source.grab() {
                warn!("grab failed on {}: {e}", d.path.display());
            }
        }
        self.grabbed = true;
        info!("grabbed {} input device(s)", self.devices.len());
    }
}

impl Drop for InputAttachment {
    fn drop(&mut self) {
        if self.grabbed {
            for d in self.devices.iter_mut() {
                if let Err(e) = d.source.ungrab() {
                    warn!("ungrab failed on {}: {e}", d.path.display());
                }
            }
        }
        info!("detached {} input device(s)", self.devices.len());
    }
}

/// Feeds one adapter from several devices. While a gesture is held only the
/// device that started it is listened to, so a second mouse or a device
/// going away elsewhere cannot end or steer it.
#[derive(Debug, Default)]
pub struct DeviceRouter {
    driver: Option<DeviceId>,
}

impl DeviceRouter {
    pub fn driver(&self) -> Option<DeviceId> {
        self.driver
    }

    pub fn route(
        &mut self,
        adapter: &mut dyn GestureAdapter,
        device: DeviceId,
        ev: RawEvent,
    ) -> Option<GestureEvent> {
        if self.driver.is_some_and(|d| d != device) {
            return None;
        }
        let out = adapter.feed(ev);
        self.driver = adapter.is_active().then_some(device);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, collections::VecDeque, rc::Rc};

    type Log = Rc<RefCell<Vec<String>>>;

    /// Replays scripted reads; an empty script reads as WouldBlock.
    struct FakeSource {
        name: &'static str,
        reads: VecDeque<io::Result<Vec<RawEvent>>>,
        log: Log,
    }

    impl FakeSource {
        fn boxed(
            name: &'static str,
            reads: Vec<io::Result<Vec<RawEvent>>>,
            log: &Log,
        ) -> (PathBuf, Box<dyn EventSource>) {
            let src = FakeSource {
                name,
                reads: reads.into(),
                log: log.clone(),
            };
            (PathBuf::from(format!("/dev/input/{name}")), Box::new(src))
        }
    }

    impl EventSource for FakeSource {
        fn read_into(&mut self, out: &mut Vec<RawEvent>) -> io::Result<()> {
            match self.reads.pop_front() {
                Some(Ok(evs)) => {
                    out.extend(evs);
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        fn grab(&mut self) -> io::Result<()> {
            self.log.borrow_mut().push(format!("grab {}", self.name));
            Ok(())
        }

        fn ungrab(&mut self) -> io::Result<()> {
            self.log.borrow_mut().push(format!("ungrab {}", self.name));
            Ok(())
        }
    }

    fn press() -> Vec<RawEvent> {
        vec![RawEvent::PointerButton(true), RawEvent::Sync]
    }

    fn release() -> Vec<RawEvent> {
        vec![RawEvent::PointerButton(false), RawEvent::Sync]
    }

    #[test]
    fn exclusive_attachment_grabs_before_any_event_and_holds_until_drop() {
        let log = Log::default();
        let mut att = InputAttachment::from_sources(
            vec![FakeSource::boxed("mouse", vec![Ok(press()), Ok(release())], &log)],
            true,
        );
        assert_eq!(*log.borrow(), vec!["grab mouse"]);
        assert!(att.is_grabbed());

        let mut out = vec![];
        att.fetch(&mut out);
        att.fetch(&mut out);
        att.fetch(&mut out);
        assert_eq!(out.len(), 4);
        // no per-gesture toggling
        assert_eq!(*log.borrow(), vec!["grab mouse"]);

        drop(att);
        assert_eq!(*log.borrow(), vec!["grab mouse", "ungrab mouse"]);
    }

    #[test]
    fn shared_attachment_never_grabs() {
        let log = Log::default();
        let att = InputAttachment::from_sources(
            vec![FakeSource::boxed("mouse", vec![Ok(press())], &log)],
            false,
        );
        assert!(!att.is_grabbed());
        drop(att);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn lost_device_is_tagged_and_detached() {
        let log = Log::default();
        let mut att = InputAttachment::from_sources(
            vec![
                FakeSource::boxed("a", vec![Ok(press())], &log),
                FakeSource::boxed("b", vec![Err(io::Error::other("gone"))], &log),
            ],
            false,
        );
        let mut out = vec![];
        att.fetch(&mut out);
        assert_eq!(
            out,
            vec![
                (0, RawEvent::PointerButton(true)),
                (0, RawEvent::Sync),
                (1, RawEvent::Dropped),
            ]
        );
        assert_eq!(att.len(), 1);
    }

    #[test]
    fn losing_another_device_keeps_the_gesture() {
        let mut adapter = PointerAdapter::new(1.0);
        let mut router = DeviceRouter::default();
        let mut gestures = vec![];
        let stream = [
            (0, RawEvent::PointerButton(true)),
            (0, RawEvent::Sync),
            (1, RawEvent::Dropped),
            (1, RawEvent::PointerButton(true)),
            (1, RawEvent::Sync),
            (0, RawEvent::PointerRelX(30)),
            (0, RawEvent::Sync),
        ];
        for (dev, ev) in stream {
            gestures.extend(router.route(&mut adapter, dev, ev));
        }
        assert_eq!(
            gestures,
            vec![GestureEvent::start(0.0), GestureEvent::moved(30.0)]
        );
        assert_eq!(router.driver(), Some(0));

        assert_eq!(
            router.route(&mut adapter, 0, RawEvent::Dropped),
            Some(GestureEvent::end(30.0))
        );
        assert_eq!(router.driver(), None);
    }

    #[test]
    fn idle_router_accepts_any_device() {
        let mut adapter = PointerAdapter::new(1.0);
        let mut router = DeviceRouter::default();
        assert_eq!(router.route(&mut adapter, 2, RawEvent::Dropped), None);
        router.route(&mut adapter, 3, RawEvent::PointerButton(true));
        assert_eq!(
            router.route(&mut adapter, 3, RawEvent::Sync),
            Some(GestureEvent::start(0.0))
        );
        assert_eq!(router.driver(), Some(3));
    }

    fn dev(kind: SourceKind) -> DeviceInfo {
        DeviceInfo {
            path: PathBuf::from("/dev/input/event9"),
            name: "test".into(),
            kind,
            x_range: None,
        }
    }

    #[test]
    fn auto_prefers_touch() {
        let devices = [dev(SourceKind::Pointer), dev(SourceKind::Touch)];
        assert_eq!(
            select_source(SourcePreference::Auto, &devices),
            Some(SourceKind::Touch)
        );
        assert_eq!(
            select_source(SourcePreference::Auto, &devices[..1]),
            Some(SourceKind::Pointer)
        );
        assert_eq!(select_source(SourcePreference::Auto, &[]), None);
    }

    #[test]
    fn explicit_preference_requires_matching_device() {
        let devices = [dev(SourceKind::Pointer)];
        assert_eq!(select_source(SourcePreference::Touch, &devices), None);
        assert_eq!(
            select_source(SourcePreference::Pointer, &devices),
            Some(SourceKind::Pointer)
        );
    }

    #[test]
    fn decodes_touch_and_sync() {
        assert_eq!(
            decode_parts(EventType::ABSOLUTE, AbsoluteAxisCode::ABS_MT_POSITION_X.0, 512),
            Some(RawEvent::TouchX(512))
        );
        assert_eq!(
            decode_parts(EventType::ABSOLUTE, AbsoluteAxisCode::ABS_MT_TRACKING_ID.0, -1),
            Some(RawEvent::TouchTrackingId(-1))
        );
        assert_eq!(
            decode_parts(EventType::SYNCHRONIZATION, SynchronizationCode::SYN_REPORT.0, 0),
            Some(RawEvent::Sync)
        );
        assert_eq!(
            decode_parts(EventType::SYNCHRONIZATION, SynchronizationCode::SYN_DROPPED.0, 0),
            Some(RawEvent::Dropped)
        );
    }

    #[test]
    fn decodes_pointer_and_skips_noise() {
        assert_eq!(
            decode_parts(EventType::KEY, KeyCode::BTN_LEFT.0, 1),
            Some(RawEvent::PointerButton(true))
        );
        assert_eq!(decode_parts(EventType::KEY, KeyCode::BTN_LEFT.0, 2), None);
        assert_eq!(
            decode_parts(EventType::RELATIVE, RelativeAxisCode::REL_X.0, -3),
            Some(RawEvent::PointerRelX(-3))
        );
        assert_eq!(decode_parts(EventType::RELATIVE, RelativeAxisCode::REL_Y.0, 4), None);
        assert_eq!(
            decode_parts(EventType::ABSOLUTE, AbsoluteAxisCode::ABS_MT_POSITION_Y.0, 4),
            None
        );
    }
}
