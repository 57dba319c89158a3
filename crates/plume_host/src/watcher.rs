//! Hot-reload watcher
//!
//! Watches the loaded module file and reloads it into a [`ScriptContext`]
//! once changes have settled. File events arrive on the notify thread; the
//! reload itself only happens when the owner thread calls [`ModuleWatcher::poll`].

use crate::config::HotReloadConfig;
use crate::context::ScriptContext;
use crate::error::{Result, ScriptError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};

/// Reloads a module when its file changes
pub struct ModuleWatcher {
    debounce: Duration,
    watcher: Option<RecommendedWatcher>,
    events: Option<Mutex<Receiver<notify::Result<Event>>>>,
    watched: RwLock<Option<PathBuf>>,
    pending: Mutex<Option<Instant>>,
}

impl ModuleWatcher {
    pub fn new(config: &HotReloadConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let (tx, rx) = channel();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| ScriptError::WatchError(e.to_string()))?;

        Ok(Self {
            debounce: config.debounce(),
            watcher: Some(watcher),
            events: Some(Mutex::new(rx)),
            watched: RwLock::new(None),
            pending: Mutex::new(None),
        })
    }

    /// A watcher that never reports changes
    pub fn disabled() -> Self {
        Self {
            debounce: HotReloadConfig::default().debounce(),
            watcher: None,
            events: None,
            watched: RwLock::new(None),
            pending: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.watcher.is_some()
    }

    /// Watch a module file, replacing any previous one
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Ok(());
        };

        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if let Some(previous) = self.watched.write().take() {
            if let Some(previous_dir) = previous.parent() {
                let _ = watcher.unwatch(previous_dir);
            }
        }

        // Builds replace the file, so watch the directory rather than the inode
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| ScriptError::WatchError(format!("{}: {}", dir.display(), e)))?;

        log::debug!("Watching {} for hot-reload", path.display());
        *self.watched.write() = Some(path);
        Ok(())
    }

    pub fn watched(&self) -> Option<PathBuf> {
        self.watched.read().clone()
    }

    /// Mark the watched module as changed
    pub fn trigger(&self) {
        if self.watched.read().is_some() {
            *self.pending.lock() = Some(Instant::now());
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Drain file events and reload once the debounce has elapsed.
    /// Returns whether a reload happened.
    pub fn poll(&self, context: &mut ScriptContext) -> Result<bool> {
        if let Some(events) = &self.events {
            let events = events.lock();
            while let Ok(result) = events.try_recv() {
                match result {
                    Ok(event) => self.handle_event(&event),
                    Err(e) => log::warn!("Watch error: {}", e),
                }
            }
        }

        let due = match *self.pending.lock() {
            Some(since) => since.elapsed() >= self.debounce,
            None => false,
        };
        if !due {
            return Ok(false);
        }

        let Some(path) = self.watched() else {
            return Ok(false);
        };

        *self.pending.lock() = None;
        context.load_module(&path)?;
        log::info!("Hot-reloaded {}", path.display());
        Ok(true)
    }

    fn handle_event(&self, event: &Event) {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }

        let watched = self.watched.read();
        let Some(watched) = watched.as_ref() else {
            return;
        };

        let hit = event
            .paths
            .iter()
            .any(|p| is_library_file(p) && p.file_name() == watched.file_name());
        if hit {
            log::debug!("Detected change in {}", watched.display());
            *self.pending.lock() = Some(Instant::now());
        }
    }
}

/// Whether a path has a dynamic library extension
pub fn is_library_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("dll") | Some("so") | Some("dylib")
    )
}
