use crate::actions::{UinputSink, spawn_command};
use crate::config::Profile;
use crate::observer::Observer;
use anyhow::{Result, anyhow};
use log::error;
use std::sync::{Arc, Mutex};

pub fn release_key(unlocked: bool) -> &'static str {
    if unlocked {
        "release.unlocked"
    } else {
        "release.locked"
    }
}

pub fn dispatch_binding(
    key: &str,
    profile_arc: &Arc<Mutex<Profile>>,
    sink: &mut UinputSink,
) -> Result<()> {
    let (action, allow_commands) = {
        let p = profile_arc
            .lock()
            .map_err(|_| anyhow!("profile lock poisoned"))?;
        (
            p.bindings.get(key).cloned().unwrap_or_default(),
            p.meta.allow_commands,
        )
    };

    if action.is_empty() || action == "none" {
        return Ok(());
    }

    if let Some(rest) = action.strip_prefix("mouse:") {
        return sink.click_mouse(rest.trim());
    }
    if let Some(rest) = action.strip_prefix("key:") {
        return sink.key_chord(rest.trim());
    }
    if let Some(rest) = action.strip_prefix("cmd:") {
        if !allow_commands {
            return Err(anyhow!("{key}: cmd: bindings need allow_commands=true"));
        }
        spawn_command(rest.trim())?;
        return Ok(());
    }

    Err(anyhow!("unknown action mapping for {} -> '{}'", key, action))
}

/// Runs the profile's release bindings when a gesture settles.
pub struct BindingObserver {
    profile: Arc<Mutex<Profile>>,
    sink: UinputSink,
}

impl BindingObserver {
    pub fn new(profile: Arc<Mutex<Profile>>, sink: UinputSink) -> Self {
        Self { profile, sink }
    }
}

impl Observer for BindingObserver {
    fn percentage_changed(&mut self, _percentage: f32) {}

    fn unlocked_changed(&mut self, _unlocked: bool) {}

    fn released(&mut self, unlocked: bool) {
        let key = release_key(unlocked);
        if let Err(e) = dispatch_binding(key, &self.profile, &mut self.sink) {
            error!("dispatch failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with(key: &str, action: &str) -> Arc<Mutex<Profile>> {
        let mut p = Profile::bundled().unwrap();
        p.bindings.insert(key.into(), action.into());
        Arc::new(Mutex::new(p))
    }

    #[test]
    fn none_and_missing_bindings_do_nothing() {
        let mut sink = UinputSink::noop();
        let p = profile_with("release.unlocked", "none");
        assert!(dispatch_binding("release.unlocked", &p, &mut sink).is_ok());
        p.lock().unwrap().bindings.clear();
        assert!(dispatch_binding("release.locked", &p, &mut sink).is_ok());
    }

    #[test]
    fn cmd_binding_is_refused_without_opt_in() {
        let mut sink = UinputSink::noop();
        let p = profile_with("release.unlocked", "cmd:true");
        assert!(dispatch_binding("release.unlocked", &p, &mut sink).is_err());
    }

    #[test]
    fn cmd_binding_runs_when_allowed() {
        let mut sink = UinputSink::noop();
        let p = profile_with("release.unlocked", "cmd:true");
        p.lock().unwrap().meta.allow_commands = true;
        assert!(dispatch_binding("release.unlocked", &p, &mut sink).is_ok());
    }

    #[test]
    fn unknown_mouse_button_errors() {
        let mut sink = UinputSink::noop();
        let p = profile_with("release.locked", "mouse:thumb");
        assert!(dispatch_binding("release.locked", &p, &mut sink).is_err());
    }

    #[test]
    fn release_keys() {
        assert_eq!(release_key(true), "release.unlocked");
        assert_eq!(release_key(false), "release.locked");
    }
}
