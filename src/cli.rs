use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    process::Command,
    sync::mpsc,
    time::{Duration, Instant},
};

use crate::control::Control;
use crate::gesture::GestureEvent;
use crate::ipc;
use crate::observer::{ChannelObserver, Notification};
use crate::slider::{DEFAULT_THRESHOLD, SliderSnapshot};
use crate::track::Track;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("slidectl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some(op @ ("stop" | "status" | "reset" | "reload" | "list" | "doctor")) => {
            let op = if op == "stop" { "shutdown" } else { op };
            let r = ipc::client_request(serde_json::json!({ "op": op }))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: slidectl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("watch") => ipc::client_stream(serde_json::json!({"op":"subscribe"}), |v| {
            println!("{v}");
            true
        }),

        Some("simulate") => {
            // usage:
            //   slidectl simulate --track 300 --handle 50 start:0 move:220 end
            let track: f32 = pargs.opt_value_from_str("--track")?.unwrap_or(300.0);
            let handle: f32 = pargs.opt_value_from_str("--handle")?.unwrap_or(50.0);
            let threshold: f32 = pargs
                .opt_value_from_str("--threshold")?
                .unwrap_or(DEFAULT_THRESHOLD);
            let steps: Vec<String> = pargs
                .finish()
                .into_iter()
                .map(|s| s.to_string_lossy().into_owned())
                .collect();
            if steps.is_empty() {
                return Err(anyhow!(
                    "usage: slidectl simulate [--track W] [--handle H] [--threshold T] <start:X|move:X|end|reset>..."
                ));
            }

            let (notifications, snapshot) =
                simulate(Track::new(track, handle), threshold, &steps)?;
            for n in &notifications {
                println!("{}", serde_json::to_string(n)?);
            }
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// Feeds a scripted gesture through a fresh control, one frame per step.
pub fn simulate(
    track: Track,
    threshold: f32,
    steps: &[String],
) -> Result<(Vec<Notification>, SliderSnapshot)> {
    let frame = Duration::from_millis(16);
    let (tx, rx) = mpsc::channel();
    let mut control = Control::new("simulate", track, threshold, frame);
    control.subscribe(Box::new(ChannelObserver::new(tx)));

    let mut now = Instant::now();
    for step in steps {
        let (verb, arg) = match step.split_once(':') {
            Some((v, a)) => (v, Some(a)),
            None => (step.as_str(), None),
        };
        let coord = || -> Result<f32> {
            arg.ok_or_else(|| anyhow!("{step}: missing coordinate"))?
                .parse::<f32>()
                .map_err(|e| anyhow!("{step}: {e}"))
        };
        match verb {
            "start" => control.handle(GestureEvent::start(coord()?), now),
            "move" => control.handle(GestureEvent::moved(coord()?), now),
            "end" | "cancel" => control.handle(GestureEvent::end(0.0), now),
            "reset" => control.reset(),
            other => return Err(anyhow!("unknown step: {other}")),
        }
        now += frame;
        control.tick(now);
    }

    Ok((rx.try_iter().collect(), control.snapshot()))
}

fn print_help() {
    println!(
        r#"slidectl — slide-to-unlock control daemon

USAGE:
  slidectl help [command]                 Show general or command-specific help
  slidectl start                          Start the daemon
  slidectl stop                           Stop the daemon
  slidectl status                         Show control state and devices
  slidectl reset                          Return the control to locked
  slidectl watch                          Stream percentage/unlocked changes
  slidectl reload                         Reload active profile
  slidectl use <name>                     Switch active profile
  slidectl list                           List profiles
  slidectl doctor                         Diagnose permissions/devices
  slidectl simulate [opts] <steps>...     Run a scripted gesture offline

TIPS:
  - Profiles: ~/.config/slidectl/profiles
  - Active profile pointer: ~/.config/slidectl/active
  - Log level: RUST_LOG=debug
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: slidectl start\nStarts the background daemon."),
        "stop" => println!("usage: slidectl stop\nStops the running daemon."),
        "status" => println!(
            "usage: slidectl status\nShows position, percentage, unlocked flag, input source and profile."
        ),
        "reset" => println!("usage: slidectl reset\nForces the control back to the locked position."),
        "watch" => println!(
            "usage: slidectl watch\nPrints one JSON line per notification until interrupted."
        ),
        "reload" => println!(
            "usage: slidectl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: slidectl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => {
            println!("usage: slidectl list\nLists available profiles and the active one.")
        }
        "doctor" => println!(
            "usage: slidectl doctor\nChecks permissions and lists detected touch/pointer devices."
        ),
        "simulate" => println!(
            "usage: slidectl simulate [--track W] [--handle H] [--threshold T] <steps>...\n\
             steps: start:X move:X end cancel reset"
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
