//! Configuration file watcher for hot reload.
//!
//! The watcher never loads or applies anything itself: a change only
//! requests a reload through the shared depth-1 queue. The coordinator
//! reads the file again when the reload actually runs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::lifecycle::signals::ReloadTrigger;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    trigger: ReloadTrigger,
    poll_interval: Duration,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher feeding the given reload queue.
    pub fn new(path: &Path, trigger: ReloadTrigger) -> Self {
        Self {
            path: path.to_path_buf(),
            trigger,
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start watching. The returned watcher must be kept alive.
    ///
    /// Watches the parent directory so editors that replace the file
    /// through a rename are still noticed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let trigger = self.trigger.clone();
        let file_name = self.path.file_name().map(OsString::from);
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    if !touches_file(&event, file_name.as_deref()) {
                        return;
                    }
                    if trigger.request() {
                        tracing::info!("Config file change detected, reload queued");
                    } else {
                        tracing::debug!("Config file change coalesced into pending reload");
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn touches_file(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    match file_name {
        Some(name) => event.paths.iter().any(|p| p.file_name() == Some(name)),
        None => true,
    }
}
