use anyhow::{Result, anyhow};
use log::{info, warn};
use serde::Serialize;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender},
    },
    thread,
    time::{Duration, Instant},
};

use super::dispatch::BindingObserver;
use crate::actions::UinputSink;
use crate::config::Profile;
use crate::control::Control;
use crate::input::{self, DeviceRouter, InputAttachment};
use crate::observer::{ChannelObserver, LogObserver, Notification};
use crate::slider::SliderSnapshot;

pub enum PipelineCmd {
    Reset,
    Reconfigure(Profile),
}

/// What the pipeline thread publishes for `status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStatus {
    pub source: Option<&'static str>,
    pub devices: Vec<String>,
    pub text: String,
    pub control: Option<SliderSnapshot>,
}

const IDLE_SLEEP: Duration = Duration::from_millis(4);

/// Owns the control: the only place it is mutated.
pub fn run_pipeline(
    profile: Arc<Mutex<Profile>>,
    rx_cmd: Receiver<PipelineCmd>,
    tx_notif: Sender<Notification>,
    status: Arc<Mutex<PipelineStatus>>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let prof = profile
        .lock()
        .map_err(|_| anyhow!("profile lock poisoned"))?
        .clone();

    // source is chosen once; touch and pointer are never attached together
    let devices = input::discover(prof.input.device.as_deref());
    let source = input::select_source(prof.input.source, &devices);
    let mut attachment = match source {
        Some(kind) => match InputAttachment::attach(kind, &devices, prof.input.exclusive) {
            Ok(a) => Some(a),
            Err(e) => {
                warn!("{e}; control idle");
                None
            }
        },
        None => {
            warn!("no touch or pointer device detected; control idle");
            None
        }
    };
    let mut adapter = attachment
        .as_ref()
        .and(source)
        .map(|kind| input::make_adapter(kind, &devices, &prof));
    if let Some(a) = &adapter {
        info!("input source: {}", a.name());
    }

    let mut control = Control::new(
        prof.meta.text.clone(),
        prof.track.track(),
        prof.thresholds.threshold,
        prof.thresholds.frame(),
    );
    if control.slider().track().is_inert() {
        warn!("track is not wider than the handle; control is inert");
    }
    let sink = UinputSink::new().unwrap_or_else(|e| {
        warn!("uinput unavailable ({e}); bindings run in NO-OP mode");
        UinputSink::noop()
    });
    control.subscribe(Box::new(LogObserver));
    control.subscribe(Box::new(ChannelObserver::new(tx_notif)));
    control.subscribe(Box::new(BindingObserver::new(profile.clone(), sink)));

    if let Ok(mut st) = status.lock() {
        st.source = adapter.as_ref().map(|a| a.name());
        st.devices = devices
            .iter()
            .filter(|d| Some(d.kind) == source)
            .map(|d| d.describe())
            .collect();
    }

    let mut router = DeviceRouter::default();
    let mut raw = Vec::new();
    while !stop.load(Ordering::Relaxed) {
        for cmd in rx_cmd.try_iter() {
            match cmd {
                PipelineCmd::Reset => control.reset(),
                PipelineCmd::Reconfigure(p) => {
                    control.reconfigure(&p.meta.text, p.thresholds.threshold, p.thresholds.frame());
                    if let Ok(mut shared) = profile.lock() {
                        *shared = p;
                    }
                    info!("pipeline: profile applied");
                }
            }
        }

        raw.clear();
        if let Some(att) = attachment.as_mut() {
            att.fetch(&mut raw);
        }
        let idle = raw.is_empty();
        let now = Instant::now();

        if let Some(adapter) = adapter.as_mut() {
            for (device, ev) in raw.drain(..) {
                if let Some(gesture) = router.route(adapter.as_mut(), device, ev) {
                    control.handle(gesture, now);
                }
            }
        }
        control.tick(now);

        if let Ok(mut st) = status.lock() {
            st.text = control.text().to_string();
            st.control = Some(control.snapshot());
        }

        if idle {
            thread::sleep(IDLE_SLEEP);
        }
    }

    info!("pipeline: stopping");
    Ok(())
}
