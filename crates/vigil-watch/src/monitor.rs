//! Monitor lifecycle, configuration and event dispatch.
//!
//! A [`Monitor`] owns one watch session: the paths to observe, the compiled
//! filter chain, the event-type whitelist, the latency window and the
//! caller's callback. The mechanism actually observing changes is a
//! [`Backend`] picked at construction time (usually through the
//! [`registry`](crate::registry)); the monitor drives it through a uniform,
//! race-free contract regardless of which backend is active.
//!
//! Configuration happens before [`Monitor::start`], through `&mut self`
//! setters. `start` itself takes `&self` and blocks for the lifetime of the
//! backend's loop, so a caller that wants to race `start` from several
//! threads shares the monitor behind an [`std::sync::Arc`] first; at that
//! point the setters are no longer reachable and the configuration is frozen.

use crate::error::{Error, Result};
use crate::events::{Event, EventFlag, EventTypeFilter};
use crate::filter::{CompiledFilter, FilterType, PathFilter};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default latency window: one second.
pub const DEFAULT_LATENCY: Duration = Duration::from_secs(1);

/// Callback invoked with each batch of surviving events.
///
/// The second argument is the caller-owned context, stored by the monitor
/// and passed through unmodified. The callback is never invoked concurrently
/// with itself for a single monitor instance.
pub type EventCallback<C> = Box<dyn FnMut(&[Event], &mut C) + Send>;

/// A concrete event-observation backend.
///
/// Implementors provide exactly one operation: run the native observation
/// loop. The loop is expected to block for the lifetime of the monitor,
/// batching raw OS notifications within the configured latency window before
/// handing them to [`MonitorSession::notify_events`]. Detected overflow is
/// reported through [`MonitorSession::notify_overflow`]; a native failure
/// aborts the loop by returning the error, which propagates out of
/// [`Monitor::start`].
pub trait Backend: Send {
    /// Short identifier for this backend, used in logs.
    fn name(&self) -> &'static str;

    /// Run the observation loop until failure or backend-defined shutdown.
    fn run(&mut self, session: &mut MonitorSession<'_>) -> Result<()>;
}

/// Lifecycle states of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Configured,
    Running,
    Stopped,
    Failed,
}

/// Configuration owned by a monitor, frozen once the loop starts.
#[derive(Debug)]
struct MonitorConfig {
    paths: Vec<PathBuf>,
    properties: HashMap<String, String>,
    latency: Duration,
    allow_overflow: bool,
    recursive: bool,
    follow_symlinks: bool,
    filters: Vec<CompiledFilter>,
    event_type_filters: HashSet<EventFlag>,
}

impl MonitorConfig {
    fn accept_path(&self, path: &Path) -> bool {
        let candidate = path.to_string_lossy();
        for filter in &self.filters {
            if filter.is_match(&candidate) {
                return filter.filter_type() == FilterType::Include;
            }
        }
        // No filter claimed the path: accepted by default.
        true
    }

    fn accept_event_type(&self, flag: EventFlag) -> bool {
        self.event_type_filters.is_empty() || self.event_type_filters.contains(&flag)
    }

    fn filter_flags(&self, event: &Event) -> Vec<EventFlag> {
        if self.event_type_filters.is_empty() {
            return event.flags().to_vec();
        }
        event
            .flags()
            .iter()
            .copied()
            .filter(|flag| self.event_type_filters.contains(flag))
            .collect()
    }
}

/// The parts of a monitor that are exclusively owned by the running loop.
struct Runtime<C> {
    backend: Box<dyn Backend>,
    callback: EventCallback<C>,
    context: C,
}

/// One watch session: configuration, lifecycle and dispatch for a set of
/// watched paths.
///
/// `C` is the caller-owned context type handed to every callback invocation;
/// the monitor stores it and passes it through without interpreting it.
pub struct Monitor<C = ()> {
    config: MonitorConfig,
    state: Mutex<State>,
    runtime: Mutex<Runtime<C>>,
}

impl<C> Monitor<C> {
    /// Create a monitor over the given backend.
    ///
    /// Fails with a configuration error if `paths` is empty; the path set is
    /// non-empty for the lifetime of the monitor.
    pub fn new(
        backend: Box<dyn Backend>,
        paths: Vec<PathBuf>,
        callback: EventCallback<C>,
        context: C,
    ) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::Config(
                "a monitor requires at least one path to watch".to_string(),
            ));
        }

        debug!(backend = backend.name(), paths = paths.len(), "monitor created");

        Ok(Self {
            config: MonitorConfig {
                paths,
                properties: HashMap::new(),
                latency: DEFAULT_LATENCY,
                allow_overflow: false,
                recursive: false,
                follow_symlinks: false,
                filters: Vec::new(),
                event_type_filters: HashSet::new(),
            },
            state: Mutex::new(State::Configured),
            runtime: Mutex::new(Runtime {
                backend,
                callback,
                context,
            }),
        })
    }

    /// Paths this monitor watches, in the order they were supplied.
    pub fn paths(&self) -> &[PathBuf] {
        &self.config.paths
    }

    /// Replace the backend-specific property map wholesale.
    pub fn set_properties(&mut self, properties: HashMap<String, String>) {
        self.config.properties = properties;
    }

    /// Look up a backend-specific property. A missing key is an absent
    /// result, not a failure.
    pub fn get_property(&self, name: &str) -> Option<&str> {
        self.config.properties.get(name).map(String::as_str)
    }

    /// Set the latency window in seconds.
    ///
    /// The latency is the maximum time a backend may buffer events before
    /// forcing a dispatch. Fails with [`Error::InvalidLatency`] unless the
    /// value is finite and greater than zero; it is never silently clamped.
    pub fn set_latency(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(Error::InvalidLatency(seconds));
        }
        self.config.latency = Duration::from_secs_f64(seconds);
        Ok(())
    }

    /// The configured latency window.
    pub fn latency(&self) -> Duration {
        self.config.latency
    }

    /// Allow the backend to report overflow as a synthetic event instead of
    /// failing the run.
    pub fn set_allow_overflow(&mut self, allow: bool) {
        self.config.allow_overflow = allow;
    }

    /// Whether overflow is reported as an event.
    pub fn allow_overflow(&self) -> bool {
        self.config.allow_overflow
    }

    /// Watch directories recursively.
    pub fn set_recursive(&mut self, recursive: bool) {
        self.config.recursive = recursive;
    }

    /// Whether directories are watched recursively.
    pub fn recursive(&self) -> bool {
        self.config.recursive
    }

    /// Follow symbolic links while watching.
    pub fn set_follow_symlinks(&mut self, follow: bool) {
        self.config.follow_symlinks = follow;
    }

    /// Whether symbolic links are followed.
    pub fn follow_symlinks(&self) -> bool {
        self.config.follow_symlinks
    }

    /// Compile a path filter and append it to the filter chain.
    ///
    /// A compilation failure surfaces as [`Error::Pattern`] and leaves the
    /// chain unchanged.
    pub fn add_filter(&mut self, filter: &PathFilter) -> Result<()> {
        let compiled = CompiledFilter::compile(filter)?;
        self.config.filters.push(compiled);
        Ok(())
    }

    /// Compile and replace the whole filter chain.
    ///
    /// Compilation is all-or-nothing: if any pattern fails, none of the
    /// supplied filters are applied and the existing chain is kept.
    pub fn set_filters(&mut self, filters: &[PathFilter]) -> Result<()> {
        let compiled = filters
            .iter()
            .map(CompiledFilter::compile)
            .collect::<Result<Vec<_>>>()?;
        self.config.filters = compiled;
        Ok(())
    }

    /// Add a flag to the event-type whitelist.
    pub fn add_event_type_filter(&mut self, filter: EventTypeFilter) {
        self.config.event_type_filters.insert(filter.flag);
    }

    /// Replace the event-type whitelist. An empty list removes the
    /// restriction.
    pub fn set_event_type_filters(&mut self, filters: &[EventTypeFilter]) {
        self.config.event_type_filters = filters.iter().map(|f| f.flag).collect();
    }

    /// Mutable access to the caller-owned context.
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.runtime.get_mut().context
    }

    /// Replace the caller-owned context, returning the previous one.
    pub fn set_context(&mut self, context: C) -> C {
        std::mem::replace(&mut self.runtime.get_mut().context, context)
    }

    /// Whether the observation loop is currently running.
    pub fn is_running(&self) -> bool {
        *self.state.lock() == State::Running
    }

    /// Decide whether a candidate path should be reported.
    ///
    /// Filters are evaluated in the order they were added; the first filter
    /// whose pattern matches decides, and a path matching no filter is
    /// accepted. This is a pure function of the compiled filter chain.
    pub fn accept_path(&self, path: impl AsRef<Path>) -> bool {
        self.config.accept_path(path.as_ref())
    }

    /// Whether the event-type whitelist admits the given flag.
    pub fn accept_event_type(&self, flag: EventFlag) -> bool {
        self.config.accept_event_type(flag)
    }

    /// Intersect an event's flags with the whitelist.
    ///
    /// With an empty whitelist this is the identity on the event's flags. An
    /// event whose intersection is empty is treated as filtered out by
    /// [`MonitorSession::notify_events`].
    pub fn filter_flags(&self, event: &Event) -> Vec<EventFlag> {
        self.config.filter_flags(event)
    }

    /// Start the observation loop.
    ///
    /// Transitions the monitor from configured to running and delegates to
    /// the backend's loop, blocking the calling thread for the monitor's
    /// lifetime. The transition itself is guarded by a lock held only across
    /// the state check-and-set, so racing `start` calls from several threads
    /// run exactly one loop; a call that loses the race fails with
    /// [`Error::AlreadyRunning`]. A monitor starts its loop at most once:
    /// after the loop returns the monitor stays stopped (or failed) and
    /// further `start` calls fail with [`Error::Finished`].
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                State::Configured => *state = State::Running,
                State::Running => return Err(Error::AlreadyRunning),
                State::Stopped | State::Failed => return Err(Error::Finished),
            }
        }

        let mut runtime = self.runtime.lock();
        let Runtime {
            backend,
            callback,
            context,
        } = &mut *runtime;

        info!(backend = backend.name(), paths = self.config.paths.len(), "monitor starting");

        let mut deliver = |events: &[Event]| (callback)(events, context);
        let mut session = MonitorSession {
            config: &self.config,
            deliver: &mut deliver,
        };
        let result = backend.run(&mut session);

        let mut state = self.state.lock();
        match &result {
            Ok(()) => {
                info!("monitor loop finished");
                *state = State::Stopped;
            }
            Err(err) => {
                warn!(error = %err, "monitor loop failed");
                *state = State::Failed;
            }
        }

        result
    }
}

/// The monitor's dispatch surface, handed to a [`Backend`] for the duration
/// of its run.
///
/// A session exposes the frozen configuration plus the notification
/// primitives; it is the only way a backend can reach the caller's callback,
/// which keeps every backend behind the same filtering contract.
pub struct MonitorSession<'a> {
    config: &'a MonitorConfig,
    deliver: &'a mut dyn FnMut(&[Event]),
}

impl MonitorSession<'_> {
    /// Paths to observe, in the order the caller supplied them.
    pub fn paths(&self) -> &[PathBuf] {
        &self.config.paths
    }

    /// Maximum time raw events may be buffered before a dispatch.
    pub fn latency(&self) -> Duration {
        self.config.latency
    }

    /// Whether directories are watched recursively.
    pub fn recursive(&self) -> bool {
        self.config.recursive
    }

    /// Whether symbolic links are followed.
    pub fn follow_symlinks(&self) -> bool {
        self.config.follow_symlinks
    }

    /// Whether overflow may be reported as an event.
    pub fn allow_overflow(&self) -> bool {
        self.config.allow_overflow
    }

    /// Look up a backend-specific property.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.config.properties.get(name).map(String::as_str)
    }

    /// See [`Monitor::accept_path`].
    pub fn accept_path(&self, path: impl AsRef<Path>) -> bool {
        self.config.accept_path(path.as_ref())
    }

    /// See [`Monitor::accept_event_type`].
    pub fn accept_event_type(&self, flag: EventFlag) -> bool {
        self.config.accept_event_type(flag)
    }

    /// See [`Monitor::filter_flags`].
    pub fn filter_flags(&self, event: &Event) -> Vec<EventFlag> {
        self.config.filter_flags(event)
    }

    /// Filter a batch of raw events and deliver the survivors.
    ///
    /// Each event is checked against the path filter chain, then its flags
    /// are intersected with the event-type whitelist; events rejected by
    /// either stage are dropped. Arrival order is preserved and the callback
    /// is invoked exactly once with the surviving subset, and not at all if
    /// the subset is empty.
    pub fn notify_events(&mut self, batch: Vec<Event>) {
        let mut surviving = Vec::with_capacity(batch.len());
        for event in batch {
            if !self.config.accept_path(event.path()) {
                trace!(path = %event.path().display(), "path rejected by filter chain");
                continue;
            }
            let flags = self.config.filter_flags(&event);
            if flags.is_empty() {
                trace!(path = %event.path().display(), "no flag admitted by whitelist");
                continue;
            }
            surviving.push(event.with_flags(flags));
        }

        if surviving.is_empty() {
            return;
        }

        debug!(count = surviving.len(), "dispatching events");
        (self.deliver)(&surviving);
    }

    /// Report that the backend could not keep up with change volume.
    ///
    /// When overflow events are allowed, a single synthetic event carrying
    /// only [`EventFlag::Overflow`] is routed through the ordinary
    /// notification path; it is still subject to event-type filtering but
    /// never to path filtering, since an overflow is not about a specific
    /// path. Without the opt-in this is fatal for the run and the backend is
    /// expected to propagate the returned [`Error::Overflow`].
    pub fn notify_overflow(&mut self) -> Result<()> {
        if !self.config.allow_overflow {
            return Err(Error::Overflow);
        }

        warn!("backend reported event overflow");
        let event = Event::overflow();
        let flags = self.config.filter_flags(&event);
        if !flags.is_empty() {
            (self.deliver)(&[event.with_flags(flags)]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTypeFilter;
    use crate::filter::PathFilter;

    /// Backend that never runs; these tests only exercise configuration.
    struct InertBackend;

    impl Backend for InertBackend {
        fn name(&self) -> &'static str {
            "inert"
        }

        fn run(&mut self, _session: &mut MonitorSession<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn monitor() -> Monitor<()> {
        Monitor::new(
            Box::new(InertBackend),
            vec![PathBuf::from("/tmp")],
            Box::new(|_events, _ctx| {}),
            (),
        )
        .unwrap()
    }

    #[test]
    fn empty_path_set_is_rejected() {
        let result = Monitor::new(
            Box::new(InertBackend),
            Vec::new(),
            Box::new(|_events, _ctx: &mut ()| {}),
            (),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn latency_defaults_to_one_second() {
        assert_eq!(monitor().latency(), Duration::from_secs(1));
    }

    #[test]
    fn latency_must_be_positive_and_finite() {
        let mut m = monitor();
        assert!(matches!(m.set_latency(0.0), Err(Error::InvalidLatency(_))));
        assert!(matches!(m.set_latency(-1.5), Err(Error::InvalidLatency(_))));
        assert!(matches!(
            m.set_latency(f64::NAN),
            Err(Error::InvalidLatency(_))
        ));
        m.set_latency(0.25).unwrap();
        assert_eq!(m.latency(), Duration::from_millis(250));
    }

    #[test]
    fn properties_are_replaced_wholesale() {
        let mut m = monitor();
        m.set_properties(HashMap::from([(
            "poll.interval".to_string(),
            "2".to_string(),
        )]));
        assert_eq!(m.get_property("poll.interval"), Some("2"));

        m.set_properties(HashMap::from([("other".to_string(), "x".to_string())]));
        assert_eq!(m.get_property("poll.interval"), None);
        assert_eq!(m.get_property("other"), Some("x"));
    }

    #[test]
    fn missing_property_is_absent_not_an_error() {
        assert_eq!(monitor().get_property("anything"), None);
    }

    #[test]
    fn empty_filter_list_accepts_every_path() {
        let m = monitor();
        assert!(m.accept_path("/any/path/at.all"));
        assert!(m.accept_path(""));
    }

    #[test]
    fn first_match_wins() {
        let mut m = monitor();
        m.add_filter(&PathFilter::exclude(r".*\.tmp$").extended())
            .unwrap();
        m.add_filter(&PathFilter::include(r".*").extended()).unwrap();

        assert!(!m.accept_path("a.tmp"));
        assert!(m.accept_path("a.txt"));
    }

    #[test]
    fn filter_order_is_semantically_significant() {
        let mut m = monitor();
        m.add_filter(&PathFilter::include(r".*").extended()).unwrap();
        m.add_filter(&PathFilter::exclude(r".*\.tmp$").extended())
            .unwrap();

        // The catch-all include shadows the later exclude.
        assert!(m.accept_path("a.tmp"));
    }

    #[test]
    fn set_filters_is_all_or_nothing() {
        let mut m = monitor();
        m.add_filter(&PathFilter::exclude(r"\.bak$")).unwrap();

        let err = m
            .set_filters(&[
                PathFilter::include(r".*").extended(),
                PathFilter::include("(").extended(),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::Pattern { .. }));

        // The pre-existing chain is untouched.
        assert!(!m.accept_path("old.bak"));
    }

    #[test]
    fn empty_whitelist_is_identity_on_flags() {
        let m = monitor();
        let ev = Event::now("/a", vec![EventFlag::Created, EventFlag::IsFile]);
        assert_eq!(m.filter_flags(&ev), ev.flags());
        assert!(m.accept_event_type(EventFlag::Removed));
    }

    #[test]
    fn whitelist_intersects_flags() {
        let mut m = monitor();
        m.set_event_type_filters(&[
            EventTypeFilter::from(EventFlag::Created),
            EventTypeFilter::from(EventFlag::Removed),
        ]);

        let ev = Event::now("/a", vec![EventFlag::Created, EventFlag::IsFile]);
        assert_eq!(m.filter_flags(&ev), vec![EventFlag::Created]);

        let unrelated = Event::now("/b", vec![EventFlag::Updated]);
        assert!(m.filter_flags(&unrelated).is_empty());
        assert!(!m.accept_event_type(EventFlag::Updated));
    }

    #[test]
    fn set_event_type_filters_with_empty_list_lifts_restriction() {
        let mut m = monitor();
        m.add_event_type_filter(EventTypeFilter::from(EventFlag::Created));
        assert!(!m.accept_event_type(EventFlag::Removed));

        m.set_event_type_filters(&[]);
        assert!(m.accept_event_type(EventFlag::Removed));
    }

    #[test]
    fn context_accessors() {
        let mut m = Monitor::new(
            Box::new(InertBackend),
            vec![PathBuf::from("/tmp")],
            Box::new(|_events, _ctx: &mut u32| {}),
            7u32,
        )
        .unwrap();

        assert_eq!(*m.context_mut(), 7);
        *m.context_mut() = 9;
        assert_eq!(m.set_context(11), 9);
        assert_eq!(*m.context_mut(), 11);
    }

    #[test]
    fn start_consumes_the_one_shot() {
        let m = monitor();
        assert!(!m.is_running());
        m.start().unwrap();
        // The loop ran and returned; the monitor never becomes startable
        // again, and says so rather than claiming it is still running.
        assert!(matches!(m.start(), Err(Error::Finished)));
        assert!(!m.is_running());
    }

    #[test]
    fn failed_run_also_consumes_the_one_shot() {
        struct FailingBackend;

        impl Backend for FailingBackend {
            fn name(&self) -> &'static str {
                "failing"
            }

            fn run(&mut self, _session: &mut MonitorSession<'_>) -> Result<()> {
                Err(Error::Watch("backend broke".to_string()))
            }
        }

        let m: Monitor<()> = Monitor::new(
            Box::new(FailingBackend),
            vec![PathBuf::from("/tmp")],
            Box::new(|_events, _ctx| {}),
            (),
        )
        .unwrap();

        assert!(matches!(m.start(), Err(Error::Watch(_))));
        assert!(matches!(m.start(), Err(Error::Finished)));
    }
}
