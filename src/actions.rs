use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::{
    process::{Command, ExitStatus},
    thread,
};

pub struct UinputSink {
    #[allow(dead_code)]
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    pub fn new() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create()?;
            return Ok(Self {
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self::noop())
        }
    }

    pub fn noop() -> Self {
        Self { linux: None }
    }

    pub fn click_mouse(&mut self, which: &str) -> Result<()> {
        let button = match which.to_ascii_lowercase().as_str() {
            "left" => MouseButton::Left,
            "right" => MouseButton::Right,
            "middle" => MouseButton::Middle,
            other => return Err(anyhow!("unknown mouse button: {other}")),
        };
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.click(button)?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = button;
        Ok(())
    }

    /// Send a chord like "SUPER+L" or single "ENTER"
    pub fn key_chord(&mut self, chord: &str) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            let mut keys = Vec::new();
            for p in chord.split('+').map(|s| s.trim().to_ascii_uppercase()) {
                keys.push(map_key(&p)?);
            }
            // press in order
            for k in &keys {
                dev.key_send(*k, 1)?;
            }
            dev.sync()?;
            // release in reverse
            for k in keys.iter().rev() {
                dev.key_send(*k, 0)?;
            }
            dev.sync()?;
        }
        Ok(())
    }
}

/// Runs a shell command without blocking the caller. A reaper thread waits
/// on the child so it never lingers as a zombie; its handle yields the exit
/// status.
pub fn spawn_command(cmdline: &str) -> Result<thread::JoinHandle<Option<ExitStatus>>> {
    let mut child = Command::new("sh").arg("-c").arg(cmdline).spawn()?;
    let pid = child.id();
    info!("spawned '{cmdline}' (pid={pid})");
    let reaper = thread::Builder::new()
        .name(format!("reap-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => {
                debug!("command pid={pid} exited: {status}");
                Some(status)
            }
            Err(e) => {
                warn!("waiting on pid={pid} failed: {e}");
                None
            }
        })?;
    Ok(reaper)
}

#[derive(Debug, Clone, Copy)]
enum MouseButton {
    Left,
    Right,
    Middle,
}

#[cfg(target_os = "linux")]
fn map_key(tok: &str) -> Result<uinput::event::keyboard::Key> {
    use uinput::event::keyboard::Key as K;
    let k = match tok {
        "CTRL" | "CONTROL" => K::LeftControl,
        "ALT" => K::LeftAlt,
        "SHIFT" => K::LeftShift,
        "SUPER" | "META" | "WIN" => K::LeftMeta,
        "ENTER" | "RETURN" => K::Enter,
        "ESC" | "ESCAPE" => K::Esc,
        "SPACE" => K::Space,
        "TAB" => K::Tab,
        "L" => K::L,
        "U" => K::U,
        other => return Err(anyhow!("unsupported key token: {other}")),
    };
    Ok(k)
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create() -> Result<Self> {
        use uinput::event::{controller::Mouse, keyboard};

        let dev = uinput::default()?
            .name("Slidectl Virtual Input")?
            .event(Mouse::Left)?
            .event(Mouse::Right)?
            .event(Mouse::Middle)?
            .event(keyboard::Key::LeftControl)?
            .event(keyboard::Key::LeftAlt)?
            .event(keyboard::Key::LeftShift)?
            .event(keyboard::Key::LeftMeta)?
            .event(keyboard::Key::Enter)?
            .event(keyboard::Key::Esc)?
            .event(keyboard::Key::Space)?
            .event(keyboard::Key::Tab)?
            .event(keyboard::Key::L)?
            .event(keyboard::Key::U)?
            .create()?;

        info!("uinput: created virtual device");
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn key_send(&mut self, key: uinput::event::keyboard::Key, val: i32) -> Result<()> {
        self.dev.send(key, val)?;
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> Result<()> {
        use uinput::event::controller::Mouse;
        let m = match button {
            MouseButton::Left => Mouse::Left,
            MouseButton::Right => Mouse::Right,
            MouseButton::Middle => Mouse::Middle,
        };
        self.dev.send(m, 1)?;
        self.sync()?;
        self.dev.send(m, 0)?;
        self.sync()
    }
}
