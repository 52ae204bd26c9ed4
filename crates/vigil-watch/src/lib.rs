//! # Vigil File Monitoring Framework
//!
//! A cross-platform filesystem change notification framework. Callers
//! register interest in a set of paths, receive batches of change events
//! bounded by a configurable latency window, and narrow the stream with
//! path-pattern filters and an event-type whitelist before it reaches
//! application code.
//!
//! ## Architecture Overview
//!
//! The mechanism observing changes is a hot-swappable backend selected at
//! runtime by name or type tag; filtering, batching policy and the dispatch
//! contract are uniform across all backends:
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   Application   │───▶│     Registry     │───▶│     Monitor     │
//! │                 │    │    (factory)     │    │  (lifecycle +   │
//! └─────────────────┘    └──────────────────┘    │   filtering)    │
//!         ▲                                      └─────────────────┘
//!         │                                               │
//!         │              ┌──────────────────┐             ▼
//!         └──────────────│  Event batches   │◀── Backend loop (native
//!            callback    │ (filtered, in    │    notifications or
//!                        │  arrival order)  │    portable polling)
//!                        └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use vigil_watch::{registry, MonitorType, PathFilter};
//!
//! let mut monitor = registry::create_monitor_of_type(
//!     MonitorType::recommended(),
//!     vec!["/var/log".into()],
//!     Box::new(|events, _ctx: &mut ()| {
//!         for event in events {
//!             println!("{}: {:?}", event.path().display(), event.flags());
//!         }
//!     }),
//!     (),
//! )?;
//!
//! monitor.set_recursive(true);
//! monitor.set_latency(0.5)?;
//! monitor.add_filter(&PathFilter::exclude(r"\.tmp$"))?;
//!
//! // Blocks for the lifetime of the watch; run on a dedicated thread if
//! // the caller needs to keep going.
//! monitor.start()?;
//! # Ok::<(), vigil_watch::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod backends;
pub mod error;
mod events;
mod filter;
mod monitor;
pub mod registry;

pub use error::{Error, Result};
pub use events::{Event, EventFlag, EventTypeFilter};
pub use filter::{CompiledFilter, FilterType, PathFilter};
pub use monitor::{Backend, EventCallback, Monitor, MonitorSession, DEFAULT_LATENCY};
pub use registry::{
    create_monitor, create_monitor_of_type, exists_type, get_types, register_creator,
    BackendRegistry,
};

/// Available monitor backends, paralleling the registry's string names.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
pub enum MonitorType {
    /// OS-native file system notifications.
    Native,
    /// Cross-platform polling fallback.
    Poll,
}

impl MonitorType {
    /// Registry name for this monitor type.
    pub fn name(&self) -> &'static str {
        match self {
            MonitorType::Native => backends::NATIVE_BACKEND_NAME,
            MonitorType::Poll => backends::POLL_BACKEND_NAME,
        }
    }

    /// The preferred backend for the current platform.
    pub fn recommended() -> Self {
        MonitorType::Native
    }
}

impl std::fmt::Display for MonitorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
