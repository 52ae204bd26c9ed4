//! Native backend built on OS-specific file system notifications.
//!
//! Uses the platform's recommended watcher (inotify, FSEvents, kqueue or
//! ReadDirectoryChangesW) through the `notify` crate. Raw notifications are
//! funneled into a channel by the watcher's callback thread; the run loop
//! drains that channel in windows bounded by the monitor's latency and hands
//! each window to the dispatch pipeline as one batch.

use crate::error::{Error, Result};
use crate::events::{Event, EventFlag};
use crate::monitor::{Backend, MonitorSession};
use flume::RecvTimeoutError;
use notify::event::{CreateKind, EventKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::time::Instant;
use tracing::{debug, info, trace};

/// Backend observing changes through OS-native notification APIs.
pub struct NativeBackend;

impl NativeBackend {
    /// Create a new native backend.
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for NativeBackend {
    fn name(&self) -> &'static str {
        super::NATIVE_BACKEND_NAME
    }

    fn run(&mut self, session: &mut MonitorSession<'_>) -> Result<()> {
        let (tx, rx) = flume::unbounded::<notify::Result<notify::Event>>();

        // The watcher invokes this from its own thread; a send failure means
        // the run loop is gone and the notification can only be dropped.
        let mut watcher = RecommendedWatcher::new(
            move |raw| {
                let _ = tx.send(raw);
            },
            watcher_config(session.follow_symlinks()),
        )?;

        let mode = if session.recursive() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        for path in session.paths() {
            watcher.watch(path, mode)?;
            debug!(path = %path.display(), "watching path");
        }

        let latency = session.latency();
        info!(paths = session.paths().len(), ?latency, "native watcher running");

        loop {
            // Block until the first raw notification of the window, then
            // keep draining until the latency window closes.
            let mut batch = Vec::new();
            let mut overflow = false;
            ingest(rx.recv()?, &mut batch, &mut overflow)?;

            let deadline = Instant::now() + latency;
            while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                match rx.recv_timeout(remaining) {
                    Ok(raw) => ingest(raw, &mut batch, &mut overflow)?,
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(Error::Channel("watcher channel closed".to_string()));
                    }
                }
            }

            if overflow {
                session.notify_overflow()?;
            }
            if !batch.is_empty() {
                trace!(count = batch.len(), "latency window closed");
                session.notify_events(batch);
            }
        }
    }
}

/// Watcher configuration for a monitor's symlink policy.
///
/// The library default follows symlinks; the monitor default does not, so
/// the flag must be set explicitly either way.
fn watcher_config(follow_symlinks: bool) -> Config {
    Config::default().with_follow_symlinks(follow_symlinks)
}

/// Fold one raw notification into the current window.
///
/// A watcher error aborts the run; a rescan signal marks the window as
/// overflowed instead of contributing events.
fn ingest(
    raw: notify::Result<notify::Event>,
    batch: &mut Vec<Event>,
    overflow: &mut bool,
) -> Result<()> {
    let raw = raw?;
    if raw.need_rescan() {
        *overflow = true;
        return Ok(());
    }
    batch.extend(convert(&raw));
    Ok(())
}

/// Convert one raw notification into framework events, one per path.
fn convert(raw: &notify::Event) -> Vec<Event> {
    // A completed rename carries both sides in path order.
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = raw.kind {
        if raw.paths.len() >= 2 {
            return vec![
                Event::now(
                    raw.paths[0].clone(),
                    vec![EventFlag::MovedFrom, EventFlag::Renamed],
                ),
                Event::now(
                    raw.paths[1].clone(),
                    vec![EventFlag::MovedTo, EventFlag::Renamed],
                ),
            ];
        }
    }

    let flags = flags_for_kind(&raw.kind);
    if flags.is_empty() {
        return Vec::new();
    }
    raw.paths
        .iter()
        .map(|path| Event::now(path.clone(), flags.clone()))
        .collect()
}

fn flags_for_kind(kind: &EventKind) -> Vec<EventFlag> {
    match kind {
        EventKind::Create(CreateKind::File) => vec![EventFlag::Created, EventFlag::IsFile],
        EventKind::Create(CreateKind::Folder) => vec![EventFlag::Created, EventFlag::IsDir],
        EventKind::Create(_) => vec![EventFlag::Created],
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            vec![EventFlag::Updated]
        }
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Ownership)) => {
            vec![EventFlag::OwnerModified]
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => vec![EventFlag::AttributeModified],
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => vec![EventFlag::MovedFrom],
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => vec![EventFlag::MovedTo],
        EventKind::Modify(ModifyKind::Name(_)) => vec![EventFlag::Renamed],
        EventKind::Modify(ModifyKind::Other) => vec![EventFlag::PlatformSpecific],
        EventKind::Remove(RemoveKind::File) => vec![EventFlag::Removed, EventFlag::IsFile],
        EventKind::Remove(RemoveKind::Folder) => vec![EventFlag::Removed, EventFlag::IsDir],
        EventKind::Remove(_) => vec![EventFlag::Removed],
        // Access notifications carry no change the taxonomy reports.
        EventKind::Access(_) => Vec::new(),
        EventKind::Any | EventKind::Other => vec![EventFlag::PlatformSpecific],
    }
}
