//! Progress reporting for downloads.
//!
//! The engine talks to a [`ProgressReporter`]; the process-wide
//! [`ProgressRegistry`] renders one indicatif bar per active file.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::error::Error;

const BAR_TEMPLATE: &str =
    "{prefix} {bytes}/{total_bytes} [{wide_bar}] {percent}% {binary_bytes_per_sec} {msg}";

/// Factory for per-download progress handles.
pub trait ProgressReporter: Send + Sync {
    /// Start tracking `name`, `start` of `total` bytes already present.
    fn create(&self, name: &str, total: u64, start: u64) -> Box<dyn ProgressHandle>;
}

/// Progress of one streaming attempt.
pub trait ProgressHandle: Send {
    /// `bytes` more were written.
    fn update(&mut self, bytes: u64);
    fn success(self: Box<Self>);
    fn fail(self: Box<Self>, cause: &Error);
}

/// Reporter that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn create(&self, _name: &str, _total: u64, _start: u64) -> Box<dyn ProgressHandle> {
        Box::new(NoopReporter)
    }
}

impl ProgressHandle for NoopReporter {
    fn update(&mut self, _bytes: u64) {}
    fn success(self: Box<Self>) {}
    fn fail(self: Box<Self>, _cause: &Error) {}
}

struct RegistryInner {
    multi: MultiProgress,
    style: ProgressStyle,
    tasks: Mutex<HashMap<String, ProgressBar>>,
}

/// Shared registry of active downloads keyed by file name.
///
/// Cloning is cheap; clones share the same task map and bars.
#[derive(Clone)]
pub struct ProgressRegistry {
    inner: Arc<RegistryInner>,
}

static GLOBAL: OnceLock<ProgressRegistry> = OnceLock::new();

impl ProgressRegistry {
    /// Registry drawing to `target`.
    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        Self {
            inner: Arc::new(RegistryInner {
                multi: MultiProgress::with_draw_target(target),
                style,
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registry that tracks tasks without drawing.
    pub fn hidden() -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden())
    }

    /// Process-wide registry, created on first use and drawing to stderr.
    pub fn global() -> &'static ProgressRegistry {
        GLOBAL.get_or_init(|| Self::with_draw_target(ProgressDrawTarget::stderr()))
    }

    /// Names of downloads currently streaming.
    pub fn active_tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks().keys().cloned().collect();
        names.sort();
        names
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, ProgressBar>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, name: &str) {
        self.tasks().remove(name);
    }
}

impl std::fmt::Debug for ProgressRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressRegistry")
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

impl ProgressReporter for ProgressRegistry {
    fn create(&self, name: &str, total: u64, start: u64) -> Box<dyn ProgressHandle> {
        let bar = self.inner.multi.add(ProgressBar::new(total));
        bar.set_style(self.inner.style.clone());
        bar.set_prefix(name.to_string());
        bar.set_position(start);

        // A re-registered name replaces the stale bar.
        if let Some(old) = self.tasks().insert(name.to_string(), bar.clone()) {
            old.finish_and_clear();
        }

        Box::new(RegistryHandle {
            registry: self.clone(),
            name: name.to_string(),
            bar,
        })
    }
}

struct RegistryHandle {
    registry: ProgressRegistry,
    name: String,
    bar: ProgressBar,
}

impl ProgressHandle for RegistryHandle {
    fn update(&mut self, bytes: u64) {
        self.bar.inc(bytes);
    }

    fn success(self: Box<Self>) {
        self.bar.finish();
        self.registry.remove(&self.name);
    }

    fn fail(self: Box<Self>, cause: &Error) {
        self.bar.abandon_with_message(format!("failed: {}", cause));
        self.registry.remove(&self.name);
    }
}
