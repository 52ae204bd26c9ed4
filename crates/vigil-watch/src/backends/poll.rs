//! Portable polling backend.
//!
//! Fallback for platforms or filesystems without usable native
//! notifications. Each latency tick the watched trees are rescanned into a
//! modification-time snapshot; the difference between consecutive snapshots
//! becomes one batch of created/updated/removed events.

use crate::error::Result;
use crate::events::{Event, EventFlag};
use crate::monitor::{Backend, MonitorSession};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, trace, warn};

/// Backend observing changes by periodic rescans.
pub struct PollBackend;

impl PollBackend {
    /// Create a new polling backend.
    pub fn new() -> Self {
        Self
    }
}

impl Default for PollBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// What the scanner remembers about one path between ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileState {
    mtime: SystemTime,
    is_dir: bool,
    is_symlink: bool,
}

impl FileState {
    fn type_flags(&self) -> Vec<EventFlag> {
        let mut flags = Vec::with_capacity(2);
        if self.is_dir {
            flags.push(EventFlag::IsDir);
        } else {
            flags.push(EventFlag::IsFile);
        }
        if self.is_symlink {
            flags.push(EventFlag::IsSymLink);
        }
        flags
    }
}

impl Backend for PollBackend {
    fn name(&self) -> &'static str {
        super::POLL_BACKEND_NAME
    }

    fn run(&mut self, session: &mut MonitorSession<'_>) -> Result<()> {
        let mut previous = scan(session.paths(), session.recursive(), session.follow_symlinks());
        info!(
            entries = previous.len(),
            interval = ?session.latency(),
            "poll watcher running"
        );

        loop {
            thread::sleep(session.latency());
            let current = scan(session.paths(), session.recursive(), session.follow_symlinks());
            let batch = diff(&previous, &current);
            previous = current;

            if !batch.is_empty() {
                trace!(count = batch.len(), "scan tick produced changes");
                session.notify_events(batch);
            }
        }
    }
}

/// Snapshot the watched trees.
///
/// Unreadable entries are skipped rather than failing the scan: a path that
/// races with a deletion, or a root that does not exist yet, simply stays
/// out of the snapshot and surfaces as created once it becomes readable.
fn scan(paths: &[PathBuf], recursive: bool, follow_symlinks: bool) -> HashMap<PathBuf, FileState> {
    let mut snapshot = HashMap::new();
    for root in paths {
        let mut stack = vec![(root.clone(), 0usize)];
        while let Some((path, depth)) = stack.pop() {
            let metadata = if follow_symlinks {
                fs::metadata(&path)
            } else {
                fs::symlink_metadata(&path)
            };
            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(err) => {
                    trace!(path = %path.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };

            let state = FileState {
                mtime: metadata.modified().unwrap_or(UNIX_EPOCH),
                is_dir: metadata.is_dir(),
                is_symlink: metadata.file_type().is_symlink(),
            };

            // The root's direct children are always listed; deeper levels
            // only when watching recursively.
            if state.is_dir && (recursive || depth == 0) {
                match fs::read_dir(&path) {
                    Ok(entries) => {
                        for entry in entries.flatten() {
                            stack.push((entry.path(), depth + 1));
                        }
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "cannot list directory");
                    }
                }
            }

            snapshot.insert(path, state);
        }
    }
    snapshot
}

/// Diff two snapshots into a batch of events.
fn diff(
    previous: &HashMap<PathBuf, FileState>,
    current: &HashMap<PathBuf, FileState>,
) -> Vec<Event> {
    let mut events = Vec::new();

    for (path, state) in current {
        match previous.get(path) {
            None => events.push(change_event(path, EventFlag::Created, state)),
            Some(old) if old.mtime != state.mtime => {
                events.push(change_event(path, EventFlag::Updated, state));
            }
            Some(_) => {}
        }
    }

    for (path, state) in previous {
        if !current.contains_key(path) {
            events.push(change_event(path, EventFlag::Removed, state));
        }
    }

    events
}

fn change_event(path: &Path, change: EventFlag, state: &FileState) -> Event {
    let mut flags = vec![change];
    flags.extend(state.type_flags());
    Event::now(path, flags)
}
