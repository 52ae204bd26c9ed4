//! Change event types and the event-type whitelist.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Flags describing what happened to a watched path.
///
/// An event carries one or more flags; backends are free to combine a change
/// flag (for example [`EventFlag::Created`]) with a file-type flag (for
/// example [`EventFlag::IsFile`]) on the same event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventFlag {
    /// No meaningful change. Backends may emit this for raw notifications
    /// they cannot classify at all.
    NoOp,
    /// A platform-specific change with no portable classification.
    PlatformSpecific,
    /// File or directory was created.
    Created,
    /// File contents were updated.
    Updated,
    /// File or directory was removed.
    Removed,
    /// File or directory was renamed.
    Renamed,
    /// Ownership changed.
    OwnerModified,
    /// Attributes or other metadata changed.
    AttributeModified,
    /// Source side of a move.
    MovedFrom,
    /// Destination side of a move.
    MovedTo,
    /// The path is a regular file.
    IsFile,
    /// The path is a directory.
    IsDir,
    /// The path is a symbolic link.
    IsSymLink,
    /// The link count of the path changed.
    Link,
    /// The backend dropped notifications; some changes were lost.
    Overflow,
}

impl EventFlag {
    /// Every flag the framework knows about, in declaration order.
    pub const ALL: [EventFlag; 15] = [
        EventFlag::NoOp,
        EventFlag::PlatformSpecific,
        EventFlag::Created,
        EventFlag::Updated,
        EventFlag::Removed,
        EventFlag::Renamed,
        EventFlag::OwnerModified,
        EventFlag::AttributeModified,
        EventFlag::MovedFrom,
        EventFlag::MovedTo,
        EventFlag::IsFile,
        EventFlag::IsDir,
        EventFlag::IsSymLink,
        EventFlag::Link,
        EventFlag::Overflow,
    ];

    /// Canonical name of this flag, as accepted by [`EventFlag::from_str`].
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFlag::NoOp => "NoOp",
            EventFlag::PlatformSpecific => "PlatformSpecific",
            EventFlag::Created => "Created",
            EventFlag::Updated => "Updated",
            EventFlag::Removed => "Removed",
            EventFlag::Renamed => "Renamed",
            EventFlag::OwnerModified => "OwnerModified",
            EventFlag::AttributeModified => "AttributeModified",
            EventFlag::MovedFrom => "MovedFrom",
            EventFlag::MovedTo => "MovedTo",
            EventFlag::IsFile => "IsFile",
            EventFlag::IsDir => "IsDir",
            EventFlag::IsSymLink => "IsSymLink",
            EventFlag::Link => "Link",
            EventFlag::Overflow => "Overflow",
        }
    }
}

impl fmt::Display for EventFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventFlag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventFlag::ALL
            .into_iter()
            .find(|flag| flag.as_str() == s)
            .ok_or_else(|| Error::Config(format!("No event flag named '{}'", s)))
    }
}

/// A single filesystem change.
///
/// Events are immutable once constructed: they are produced by a backend,
/// passed through the monitor's filtering pipeline and handed to the caller's
/// callback, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    path: PathBuf,
    timestamp: DateTime<Utc>,
    flags: Vec<EventFlag>,
}

impl Event {
    /// Create a new event with an explicit timestamp.
    pub fn new(path: impl Into<PathBuf>, timestamp: DateTime<Utc>, flags: Vec<EventFlag>) -> Self {
        Self {
            path: path.into(),
            timestamp,
            flags,
        }
    }

    /// Create a new event timestamped with the current time.
    pub fn now(path: impl Into<PathBuf>, flags: Vec<EventFlag>) -> Self {
        Self::new(path, Utc::now(), flags)
    }

    /// Synthetic event signalling that the backend dropped notifications.
    ///
    /// Carries no path; an overflow is not about any specific file.
    pub(crate) fn overflow() -> Self {
        Self::now(PathBuf::new(), vec![EventFlag::Overflow])
    }

    /// Path this event refers to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the event occurred.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Flags carried by this event, in the order the backend set them.
    pub fn flags(&self) -> &[EventFlag] {
        &self.flags
    }

    /// Check whether this event carries the given flag.
    pub fn has_flag(&self, flag: EventFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Copy of this event carrying a different flag set, used by the filter
    /// pipeline when a whitelist narrows the original flags.
    pub(crate) fn with_flags(&self, flags: Vec<EventFlag>) -> Self {
        Self {
            path: self.path.clone(),
            timestamp: self.timestamp,
            flags,
        }
    }
}

/// Whitelist entry for event-type filtering.
///
/// The aggregate set of these filters on a monitor restricts which flags of
/// an event are considered interesting; an empty set means no restriction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventTypeFilter {
    /// The whitelisted flag.
    pub flag: EventFlag,
}

impl From<EventFlag> for EventTypeFilter {
    fn from(flag: EventFlag) -> Self {
        Self { flag }
    }
}
