use anyhow::{Result, anyhow};
use log::{error, info, warn};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
    },
    thread,
    time::Duration,
};

use super::pipeline::{PipelineCmd, PipelineStatus, run_pipeline};
use super::runtime::{SocketGuard, socket_path};
use super::watch::watch_profiles;
use crate::config::{DaemonConfigState, Profile};
use crate::observer::Notification;

const SUBSCRIBER_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    let _sock_guard = SocketGuard::new(sock.clone());
    info!("daemon: listening on {}", sock.display());

    // state
    let mut cfg = DaemonConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);

    let stop = Arc::new(AtomicBool::new(false));
    install_signal_handlers(stop.clone())?;

    // channels
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let (tx_notif, rx_notif) = mpsc::channel::<Notification>();
    let status = Arc::new(Mutex::new(PipelineStatus::default()));

    let _watcher = match watch_profiles(&cfg.profiles_dir, tx_req.clone()) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("profile watching disabled: {e}");
            None
        }
    };

    // input thread
    let pipeline = PipelineThread::start(cfg.profile.clone(), tx_notif, status.clone(), stop.clone());

    // accept loop
    let mut subscribers: Vec<UnixStream> = Vec::new();
    listener.set_nonblocking(true)?;
    while !stop.load(Ordering::Relaxed) {
        if let Ok((stream, _)) = listener.accept() {
            let tx = tx_req.clone();
            let view = ClientView {
                cfg: cfg.clone(),
                status: status.clone(),
                socket: sock.clone(),
            };
            thread::spawn(move || {
                if let Err(e) = handle_client(stream, view, tx) {
                    error!("ipc client error: {e}");
                }
            });
        }

        for n in rx_notif.try_iter() {
            broadcast(&mut subscribers, &n);
        }

        for msg in rx_req.try_iter() {
            match msg {
                IpcMsg::Reload => match cfg.reload() {
                    Ok(()) => {
                        pipeline.send(PipelineCmd::Reconfigure(cfg.profile.clone()));
                        info!("profile reloaded");
                    }
                    Err(e) => error!("reload failed: {e}"),
                },
                IpcMsg::UseProfile(name) => match cfg.set_active(&name) {
                    Ok(()) => {
                        pipeline.send(PipelineCmd::Reconfigure(cfg.profile.clone()));
                        info!("switched active profile to {}", cfg.active_name);
                    }
                    Err(e) => error!("use profile failed: {e}"),
                },
                IpcMsg::Reset => pipeline.send(PipelineCmd::Reset),
                IpcMsg::Subscribe(stream) => {
                    info!("subscriber attached ({} total)", subscribers.len() + 1);
                    subscribers.push(stream);
                }
                IpcMsg::Shutdown => stop.store(true, Ordering::Relaxed),
            }
        }

        thread::sleep(Duration::from_millis(5));
    }

    info!("daemon: shutting down");
    pipeline.join();
    Ok(())
}

fn install_signal_handlers(stop: Arc<AtomicBool>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("daemon: received signal {sig}");
            stop.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}

fn broadcast(subscribers: &mut Vec<UnixStream>, n: &Notification) {
    let line = match serde_json::to_string(n) {
        Ok(l) => l + "\n",
        Err(e) => {
            error!("cannot encode notification: {e}");
            return;
        }
    };
    subscribers.retain_mut(|s| s.write_all(line.as_bytes()).is_ok());
}

fn handle_client(mut stream: UnixStream, view: ClientView, tx_req: Sender<IpcMsg>) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let resp = match op {
        "status" => {
            let pipeline = view
                .status
                .lock()
                .map(|s| s.clone())
                .unwrap_or_default();
            serde_json::json!({"ok": true, "data": {
                "active_profile": view.cfg.active_name,
                "socket": view.socket,
                "source": pipeline.source,
                "devices": pipeline.devices,
                "text": pipeline.text,
                "control": pipeline.control,
            }})
        }
        "reset" => {
            let _ = tx_req.send(IpcMsg::Reset);
            serde_json::json!({"ok": true, "data": "reset"})
        }
        "subscribe" => {
            writeln!(stream, "{}", serde_json::json!({"ok": true, "data": "subscribed"}))?;
            stream.set_write_timeout(Some(SUBSCRIBER_WRITE_TIMEOUT))?;
            tx_req
                .send(IpcMsg::Subscribe(stream))
                .map_err(|_| anyhow!("daemon loop is gone"))?;
            return Ok(());
        }
        "reload" => {
            let _ = tx_req.send(IpcMsg::Reload);
            serde_json::json!({"ok": true, "data": {"active_profile": view.cfg.active_name}})
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            let _ = tx_req.send(IpcMsg::UseProfile(name.to_string()));
            serde_json::json!({"ok": true, "data": {"active_profile": name}})
        }
        "list" => {
            let list = view.cfg.list_profiles();
            serde_json::json!({"ok": true, "data": {"profiles": list, "active": view.cfg.active_name}})
        }
        "doctor" => {
            let report = view.cfg.doctor_report();
            serde_json::json!({"ok": true, "data": report})
        }
        "shutdown" => {
            let _ = tx_req.send(IpcMsg::Shutdown);
            serde_json::json!({"ok": true, "data": "shutting down"})
        }
        _ => serde_json::json!({"ok": false, "error": format!("unknown op: {op}")}),
    };

    writeln!(stream, "{}", resp)?;
    Ok(())
}

/// Per-connection copy of what a client may ask about.
struct ClientView {
    cfg: DaemonConfigState,
    status: Arc<Mutex<PipelineStatus>>,
    socket: PathBuf,
}

pub(super) enum IpcMsg {
    Reload,
    UseProfile(String),
    Reset,
    Subscribe(UnixStream),
    Shutdown,
}

struct PipelineThread {
    tx_cmd: Sender<PipelineCmd>,
    handle: thread::JoinHandle<()>,
}

impl PipelineThread {
    fn start(
        profile: Profile,
        tx_notif: Sender<Notification>,
        status: Arc<Mutex<PipelineStatus>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let (tx_cmd, rx_cmd) = mpsc::channel();
        let profile_arc = Arc::new(Mutex::new(profile));
        let handle = thread::spawn(move || {
            if let Err(e) = run_pipeline(profile_arc, rx_cmd, tx_notif, status, stop) {
                error!("input pipeline failed: {e}");
            }
        });
        Self { tx_cmd, handle }
    }

    fn send(&self, cmd: PipelineCmd) {
        if self.tx_cmd.send(cmd).is_err() {
            warn!("input pipeline is not running");
        }
    }

    fn join(self) {
        if self.handle.join().is_err() {
            error!("input pipeline panicked");
        }
    }
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let mut reader = connect_and_send(&req)?;
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}

/// Sends `req` and hands every response line to `on_line` until it returns
/// false or the daemon closes the connection.
pub fn client_stream(
    req: serde_json::Value,
    mut on_line: impl FnMut(&serde_json::Value) -> bool,
) -> Result<()> {
    let reader = connect_and_send(&req)?;
    for line in reader.lines() {
        let v: serde_json::Value = serde_json::from_str(&line?)?;
        if !on_line(&v) {
            break;
        }
    }
    Ok(())
}

fn connect_and_send(req: &serde_json::Value) -> Result<BufReader<UnixStream>> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "slidectl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(req)? + "\n";
    stream.write_all(line.as_bytes())?;
    Ok(BufReader::new(stream))
}
