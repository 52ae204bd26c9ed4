//! Built-in event-observation backends.
//!
//! Backends implement the [`Backend`](crate::Backend) plugin contract: one
//! blocking `run` loop that batches raw OS notifications within the
//! configured latency window and feeds them through the monitor's dispatch
//! primitives. Additional backends can be plugged in at runtime via
//! [`registry::register_creator`](crate::registry::register_creator).

mod native;
mod poll;

pub use native::NativeBackend;
pub use poll::PollBackend;

use crate::monitor::Backend;
use crate::registry::BackendConstructor;
use crate::MonitorType;

/// Name under which the native backend registers itself.
pub const NATIVE_BACKEND_NAME: &str = "native";

/// Name under which the polling backend registers itself.
pub const POLL_BACKEND_NAME: &str = "poll";

/// The backends shipped with the crate, handed to the registry initializer.
pub(crate) fn builtin_backends() -> Vec<(&'static str, MonitorType, BackendConstructor)> {
    vec![
        (
            NATIVE_BACKEND_NAME,
            MonitorType::Native,
            Box::new(|| Box::new(NativeBackend::new()) as Box<dyn Backend>),
        ),
        (
            POLL_BACKEND_NAME,
            MonitorType::Poll,
            Box::new(|| Box::new(PollBackend::new()) as Box<dyn Backend>),
        ),
    ]
}
