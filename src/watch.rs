use anyhow::{anyhow, Result};
use log::warn;
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

/// Returns `(absolute, canonical)` for a path that may be relative to the working directory.
pub fn normalize_path_for_watch(path: &Path) -> Option<(PathBuf, PathBuf)> {
    let absolute = if path.is_absolute() { path.to_path_buf() } else { env::current_dir().ok()?.join(path) };
    let canonical = fs::canonicalize(&absolute).unwrap_or_else(|_| absolute.clone());
    Some((absolute, canonical))
}

pub fn normalize_event_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    } else if let Ok(cwd) = env::current_dir() {
        let absolute = cwd.join(path);
        fs::canonicalize(&absolute).unwrap_or(absolute)
    } else {
        PathBuf::from(path)
    }
}

/// Watches imported definition files and reports the ones edited on disk, keyed by the
/// path the object model registered them under.
pub struct DefinitionWatcher {
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    /// canonical path -> (watched path, registered path)
    watched: HashMap<PathBuf, (PathBuf, PathBuf)>,
}

impl DefinitionWatcher {
    pub fn new(poll_interval: Duration) -> Result<Self> {
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        if let Err(err) =
            watcher.configure(NotifyConfig::default().with_compare_contents(true).with_poll_interval(poll_interval))
        {
            warn!("[watch] definition watcher configuration warning: {err}");
        }
        Ok(Self { watcher, rx, watched: HashMap::new() })
    }

    /// Makes the watched set equal to `files`. Unwatchable files are reported but do not
    /// stop the remaining ones from being watched.
    pub fn sync(&mut self, files: &[PathBuf]) -> Result<()> {
        let mut desired: HashMap<PathBuf, (PathBuf, PathBuf)> = HashMap::new();
        for file in files {
            let Some((absolute, canonical)) = normalize_path_for_watch(file) else {
                continue;
            };
            desired.insert(canonical, (absolute, file.clone()));
        }
        let mut failures = Vec::new();
        for (canonical, (absolute, registered)) in &desired {
            if self.watched.contains_key(canonical) {
                continue;
            }
            match self.watcher.watch(absolute, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.watched.insert(canonical.clone(), (absolute.clone(), registered.clone()));
                }
                Err(err) => failures.push(format!("{}: {err}", absolute.display())),
            }
        }
        let obsolete: Vec<PathBuf> =
            self.watched.keys().filter(|path| !desired.contains_key(*path)).cloned().collect();
        for canonical in obsolete {
            if let Some((absolute, _)) = self.watched.remove(&canonical) {
                if let Err(err) = self.watcher.unwatch(&absolute) {
                    failures.push(format!("{}: {err}", absolute.display()));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("definition watch sync failed for {}", failures.join(", ")))
        }
    }

    pub fn is_watching(&self, file: &Path) -> bool {
        normalize_path_for_watch(file).map(|(_, canonical)| self.watched.contains_key(&canonical)).unwrap_or(false)
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Registered paths of the definition files changed since the last drain.
    pub fn drain_changed(&mut self) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        while let Ok(res) = self.rx.try_recv() {
            match res {
                Ok(event) => {
                    if !Self::is_relevant(&event.kind) {
                        continue;
                    }
                    for path in event.paths {
                        if let Some(registered) = self.resolve_path(&path) {
                            if !changed.contains(&registered) {
                                changed.push(registered);
                            }
                        }
                    }
                }
                Err(err) => warn!("[watch] definition watcher error: {err}"),
            }
        }
        changed
    }

    fn resolve_path(&self, path: &Path) -> Option<PathBuf> {
        let normalized = normalize_event_path(path);
        if let Some((_, registered)) = self.watched.get(&normalized) {
            return Some(registered.clone());
        }
        self.watched.values().find(|(absolute, _)| absolute.as_path() == path).map(|(_, registered)| registered.clone())
    }

    fn is_relevant(kind: &EventKind) -> bool {
        matches!(
            kind,
            EventKind::Modify(ModifyKind::Data(_))
                | EventKind::Modify(ModifyKind::Name(_))
                | EventKind::Modify(ModifyKind::Any)
                | EventKind::Create(_)
                | EventKind::Remove(_)
        )
    }
}
