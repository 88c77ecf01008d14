use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use crate::input;
use crate::slider::DEFAULT_THRESHOLD;
use crate::track::Track;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    /// Label shown on the track. Not used by the control logic.
    #[serde(default = "default_text")]
    pub text: String,
    #[serde(default)]
    pub allow_commands: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TrackConfig {
    pub track_width: f32,
    pub handle_width: f32,
}

impl TrackConfig {
    pub fn track(&self) -> Track {
        Track::new(self.track_width, self.handle_width)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,
}

impl Thresholds {
    pub fn frame(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            frame_ms: default_frame_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePreference {
    #[default]
    Auto,
    Touch,
    Pointer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub source: SourcePreference,
    #[serde(default = "default_gain")]
    pub pointer_gain: f32,
    /// Restrict to a single device node instead of scanning /dev/input.
    pub device: Option<PathBuf>,
    /// Grab the attached devices for the daemon's lifetime so the desktop
    /// never sees the drag.
    #[serde(default = "default_exclusive")]
    pub exclusive: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source: SourcePreference::Auto,
            pointer_gain: default_gain(),
            device: None,
            exclusive: default_exclusive(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    pub track: TrackConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub input: InputConfig,

    // nested/dotted tables are flattened into "a.b" -> "value"
    #[serde(default, deserialize_with = "deserialize_bindings_flat")]
    pub bindings: HashMap<String, String>,
}

impl Profile {
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn bundled() -> Result<Self> {
        Self::from_toml_str(default_profile_text())
    }
}

fn default_text() -> String {
    "Slide to unlock".to_string()
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_frame_ms() -> u64 {
    16
}

fn default_gain() -> f32 {
    1.0
}

fn default_exclusive() -> bool {
    true
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("track.{0} must be a finite, non-negative width")]
    BadWidth(&'static str),
    #[error("thresholds.threshold must be in (0,1], got {0}")]
    BadThreshold(f32),
    #[error("thresholds.frame_ms must be between 1 and 1000, got {0}")]
    BadFrame(u64),
    #[error("input.pointer_gain must be positive, got {0}")]
    BadGain(f32),
    #[error("empty binding key")]
    EmptyBindingKey,
    #[error("binding '{0}' has unknown event name")]
    UnknownBinding(String),
    #[error("binding '{0}' has invalid action '{1}'")]
    InvalidAction(String, String),
    #[error("binding '{0}' uses cmd: but allow_commands=false")]
    CommandsDisabled(String),
}

pub const BINDING_KEYS: [&str; 2] = ["release.unlocked", "release.locked"];

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot locate home directory"))?;
    Ok(dirs.home_dir().join(".config").join("slidectl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir()?;
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    /// Re-reads the active profile; the previous one stays on error.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        let devices = input::discover(self.profile.input.device.as_deref());
        let selected = input::select_source(self.profile.input.source, &devices);
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "devices": devices.iter().map(|d| d.describe()).collect::<Vec<_>>(),
            "selected_source": selected.map(|s| s.as_str()),
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
            }
        })
    }
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::from_toml_str(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))
}

pub fn validate_profile(p: &Profile) -> std::result::Result<(), ConfigError> {
    for (field, w) in [
        ("track_width", p.track.track_width),
        ("handle_width", p.track.handle_width),
    ] {
        if !w.is_finite() || w < 0.0 {
            return Err(ConfigError::BadWidth(field));
        }
    }
    let t = p.thresholds.threshold;
    if !(t > 0.0 && t <= 1.0) {
        return Err(ConfigError::BadThreshold(t));
    }
    if !(1..=1000).contains(&p.thresholds.frame_ms) {
        return Err(ConfigError::BadFrame(p.thresholds.frame_ms));
    }
    let g = p.input.pointer_gain;
    if !(g.is_finite() && g > 0.0) {
        return Err(ConfigError::BadGain(g));
    }

    for (k, v) in &p.bindings {
        if k.trim().is_empty() {
            return Err(ConfigError::EmptyBindingKey);
        }
        if !BINDING_KEYS.contains(&k.as_str()) {
            return Err(ConfigError::UnknownBinding(k.clone()));
        }

        let ok = v.starts_with("mouse:")
            || v.starts_with("key:")
            || v.starts_with("cmd:")
            || v == "none";
        if !ok {
            return Err(ConfigError::InvalidAction(k.clone(), v.clone()));
        }
        if v.starts_with("cmd:") && !p.meta.allow_commands {
            return Err(ConfigError::CommandsDisabled(k.clone()));
        }
    }
    Ok(())
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:") {
                if line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
                {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[meta]
name = "minimal"

[track]
track_width = 300.0
handle_width = 50.0
"#;

    #[test]
    fn bundled_profile_parses() {
        let p = Profile::bundled().unwrap();
        assert_eq!(p.thresholds.threshold, 0.85);
        assert_eq!(p.thresholds.frame_ms, 16);
        assert_eq!(p.input.source, SourcePreference::Auto);
        assert_eq!(p.track.track().travel(), 250.0);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let p = Profile::from_toml_str(MINIMAL).unwrap();
        assert_eq!(p.meta.text, "Slide to unlock");
        assert_eq!(p.thresholds.threshold, DEFAULT_THRESHOLD);
        assert_eq!(p.input.pointer_gain, 1.0);
        assert!(p.input.exclusive);
        assert!(p.bindings.is_empty());
    }

    #[test]
    fn exclusive_grab_can_be_turned_off() {
        let txt = format!("{MINIMAL}\n[input]\nexclusive = false\n");
        let p = Profile::from_toml_str(&txt).unwrap();
        assert!(!p.input.exclusive);
        assert_eq!(p.input.source, SourcePreference::Auto);
    }

    #[test]
    fn nested_bindings_are_flattened() {
        let txt = format!(
            "{MINIMAL}\n[bindings.release]\nunlocked = \"key:SUPER+L\"\nlocked = \"none\"\n"
        );
        let p = Profile::from_toml_str(&txt).unwrap();
        assert_eq!(p.bindings["release.unlocked"], "key:SUPER+L");
        assert_eq!(p.bindings["release.locked"], "none");
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let mut p = Profile::from_toml_str(MINIMAL).unwrap();
        p.thresholds.threshold = 1.5;
        assert_eq!(validate_profile(&p), Err(ConfigError::BadThreshold(1.5)));
        p.thresholds.threshold = 0.0;
        assert_eq!(validate_profile(&p), Err(ConfigError::BadThreshold(0.0)));
    }

    #[test]
    fn negative_width_is_rejected() {
        let mut p = Profile::from_toml_str(MINIMAL).unwrap();
        p.track.handle_width = -1.0;
        assert_eq!(
            validate_profile(&p),
            Err(ConfigError::BadWidth("handle_width"))
        );
    }

    #[test]
    fn commands_need_opt_in() {
        let mut p = Profile::from_toml_str(MINIMAL).unwrap();
        p.bindings
            .insert("release.unlocked".into(), "cmd:loginctl unlock-session".into());
        assert_eq!(
            validate_profile(&p),
            Err(ConfigError::CommandsDisabled("release.unlocked".into()))
        );
        p.meta.allow_commands = true;
        assert_eq!(validate_profile(&p), Ok(()));
    }

    #[test]
    fn unknown_binding_and_action_are_rejected() {
        let mut p = Profile::from_toml_str(MINIMAL).unwrap();
        p.bindings.insert("swipe.left".into(), "none".into());
        assert_eq!(
            validate_profile(&p),
            Err(ConfigError::UnknownBinding("swipe.left".into()))
        );
        p.bindings.clear();
        p.bindings.insert("release.locked".into(), "beep".into());
        assert_eq!(
            validate_profile(&p),
            Err(ConfigError::InvalidAction("release.locked".into(), "beep".into()))
        );
    }
}
