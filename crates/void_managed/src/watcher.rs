//! Module file watching
//!
//! Watches the directory of the loaded module and reports the module path
//! once changes to it have settled for the debounce duration.

use crate::config::WatchConfig;
use crate::error::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};

/// Debounced watcher for one module file
pub struct ModuleWatcher {
    watcher: Option<RecommendedWatcher>,
    event_receiver: Option<Receiver<notify::Result<Event>>>,
    /// Module file and the directory being watched for it
    target: Option<(PathBuf, PathBuf)>,
    /// When the last change to the target was seen
    pending: Option<Instant>,
    debounce: Duration,
}

impl ModuleWatcher {
    /// Create a watcher; a disabled config yields [`ModuleWatcher::disabled`]
    pub fn new(config: &WatchConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let (tx, rx) = channel();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;

        Ok(Self {
            watcher: Some(watcher),
            event_receiver: Some(rx),
            target: None,
            pending: None,
            debounce: config.debounce(),
        })
    }

    /// A watcher that never reports anything
    pub fn disabled() -> Self {
        Self {
            watcher: None,
            event_receiver: None,
            target: None,
            pending: None,
            debounce: WatchConfig::default().debounce(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.watcher.is_some()
    }

    /// Module file currently watched
    pub fn target(&self) -> Option<&Path> {
        self.target.as_ref().map(|(file, _)| file.as_path())
    }

    /// Watch `path`, replacing any previous target
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(());
        };

        if let Some((previous, _)) = &self.target {
            if previous.as_path() == path {
                return Ok(());
            }
        }
        if let Some((_, dir)) = self.target.take() {
            if let Err(e) = watcher.unwatch(&dir) {
                log::debug!("Could not stop watching {}: {}", dir.display(), e);
            }
        }

        // Build tools often replace the file, so watch its directory
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        log::debug!("Watching script module for changes: {}", path.display());

        self.target = Some((path.to_path_buf(), dir));
        self.pending = None;
        Ok(())
    }

    /// Stop watching
    pub fn unwatch(&mut self) {
        if let (Some(watcher), Some((_, dir))) = (self.watcher.as_mut(), self.target.take()) {
            let _ = watcher.unwatch(&dir);
        }
        self.pending = None;
    }

    /// Mark the target as changed, as if the file system had reported it
    pub fn trigger(&mut self) {
        if self.target.is_some() {
            self.pending = Some(Instant::now());
        }
    }

    /// Drain file events; returns the module path once it has settled
    pub fn poll(&mut self) -> Option<PathBuf> {
        let events: Vec<Event> = match &self.event_receiver {
            Some(rx) => rx.try_iter().filter_map(|res| res.ok()).collect(),
            None => Vec::new(),
        };
        for event in &events {
            self.handle_event(event);
        }

        let detected = self.pending?;
        if detected.elapsed() < self.debounce {
            return None;
        }
        self.pending = None;
        self.target.as_ref().map(|(file, _)| file.clone())
    }

    fn handle_event(&mut self, event: &Event) {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }
        let Some((file, _)) = &self.target else {
            return;
        };
        if event.paths.iter().any(|p| p.file_name() == file.file_name()) {
            log::debug!("Detected change in script module: {}", file.display());
            self.pending = Some(Instant::now());
        }
    }
}
