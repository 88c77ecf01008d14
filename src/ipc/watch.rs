use anyhow::Result;
use log::{debug, info, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{path::Path, sync::mpsc::Sender};

use super::server::IpcMsg;

/// Asks the daemon loop to reload whenever a profile file changes. The
/// watch stops when the returned watcher is dropped.
pub fn watch_profiles(dir: &Path, tx: Sender<IpcMsg>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(ev) => {
                let touches_profile = ev
                    .paths
                    .iter()
                    .any(|p| p.extension().is_some_and(|e| e == "toml"));
                if touches_profile && matches!(ev.kind, EventKind::Modify(_) | EventKind::Create(_))
                {
                    debug!("profile change: {:?}", ev.paths);
                    let _ = tx.send(IpcMsg::Reload);
                }
            }
            Err(e) => warn!("profile watch error: {e}"),
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!("watching {} for profile changes", dir.display());
    Ok(watcher)
}
