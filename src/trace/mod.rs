//! Structured diagnostic events.
//!
//! A trace event is an ordered list of `(key, value)` string pairs with a
//! severity. Events are buffered on the network thread, flushed in
//! batches to a dedicated writer thread through the pool, rolled on a
//! size threshold, de-duplicated within suppression windows, and mirrored
//! into a latest-event cache for crash-report snapshots.
//!
//! ```ignore
//! TraceEvent::new("ConnectionEstablished")
//!     .detail("Peer", peer)
//!     .detail("RoundTrips", count)
//!     .commit();
//! ```

mod format;
mod writer;

pub use format::TraceFormat;
pub use writer::list_trace_files;

use crate::config::Knobs;
use crate::error::{Error, ErrorKind, Result};
use crate::future::Void;
use crate::pool::{ThreadPool, ThreadPoolReceiver};
use crate::runtime::{ClockMode, Net, Priority};
use crate::threadsafe::{self, ThreadFuture, ThreadSafePromise};
use crate::util::Uid;
use format::TraceFormatter;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use writer::FileTraceLogWriter;

/// Event severity. Numeric values are what appears in the `Severity`
/// field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Diagnostic chatter, off by default.
    Debug = 5,
    /// Normal operation.
    Info = 10,
    /// Suspicious but survivable; may be suppressed.
    Warn = 20,
    /// Always worth keeping.
    WarnAlways = 30,
    /// A real failure.
    Error = 40,
}

/// An ordered set of key/value string pairs; the unit the pipeline moves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceEventFields {
    fields: Vec<(String, String)>,
    bytes: usize,
}

impl TraceEventFields {
    /// An empty field set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field, preserving insertion order.
    pub fn add_field(&mut self, name: &str, value: &str) {
        self.bytes += name.len() + value.len();
        self.fields.push((name.to_string(), value.to_string()));
    }

    /// First value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.fields.iter()
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no pairs have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total bytes of keys plus values.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.bytes
    }
}

/// Builder for one event. Commits when dropped (or via
/// [`TraceEvent::commit`]); events without a live runtime context are
/// discarded.
pub struct TraceEvent {
    severity: Severity,
    event_type: &'static str,
    id: Option<Uid>,
    details: Vec<(String, String)>,
    error: Option<Error>,
    suppress_for: f64,
    track_latest: Option<String>,
    enabled: bool,
}

impl TraceEvent {
    /// An `Info` event of the given type.
    #[must_use]
    pub fn new(event_type: &'static str) -> Self {
        Self::with_severity(Severity::Info, event_type)
    }

    /// An event with an explicit severity.
    #[must_use]
    pub fn with_severity(severity: Severity, event_type: &'static str) -> Self {
        Self {
            severity,
            event_type,
            id: None,
            details: Vec::new(),
            error: None,
            suppress_for: 0.0,
            track_latest: None,
            enabled: true,
        }
    }

    /// Attaches an identifier, written as the `ID` field.
    #[must_use]
    pub fn with_id(mut self, id: Uid) -> Self {
        self.id = Some(id);
        self
    }

    /// Appends a detail field.
    #[must_use]
    pub fn detail(mut self, key: &str, value: impl std::fmt::Display) -> Self {
        self.details.push((key.to_string(), value.to_string()));
        self
    }

    /// Attaches an error. `actor_cancelled` disables the event entirely;
    /// it is a benign end-of-life signal. An injected fault downgrades
    /// `SevError` to `SevWarnAlways` so fault injection cannot mask real
    /// bugs.
    #[must_use]
    pub fn error(self, error: &Error) -> Self {
        self.attach_error(error, false)
    }

    /// [`TraceEvent::error`], but reports `actor_cancelled` too.
    #[must_use]
    pub fn error_allow_cancelled(self, error: &Error) -> Self {
        self.attach_error(error, true)
    }

    fn attach_error(mut self, error: &Error, include_cancelled: bool) -> Self {
        if error.kind() == ErrorKind::ActorCancelled && !include_cancelled {
            self.enabled = false;
        } else {
            self.error = Some(error.clone());
        }
        self
    }

    /// Drops duplicate events of this type for `seconds` after one is
    /// written; the number suppressed is reported on the next emission.
    #[must_use]
    pub fn suppress_for(mut self, seconds: f64) -> Self {
        self.suppress_for = seconds;
        self
    }

    /// Mirrors the committed event into the latest-event cache under
    /// `key`.
    #[must_use]
    pub fn track_latest(mut self, key: &str) -> Self {
        self.track_latest = Some(key.to_string());
        self
    }

    /// Commits the event now instead of at end of scope.
    pub fn commit(self) {
        drop(self);
    }

    fn commit_inner(&mut self) {
        if !std::mem::take(&mut self.enabled) {
            return;
        }
        let Some(net) = Net::try_current() else {
            return;
        };
        let knobs = net.knobs();
        let mut severity = self.severity;
        if let Some(error) = &self.error {
            if error.is_injected_fault() && severity == Severity::Error {
                severity = Severity::WarnAlways;
            }
        }
        if (severity as i32) < knobs.min_trace_severity {
            return;
        }
        let log = net.trace_log();
        let now = match net.clock_mode() {
            ClockMode::Cached => net.now(),
            ClockMode::Precise => net.precise_now(),
        };

        let mut suppressed = 0;
        if self.suppress_for > 0.0 {
            match log.check_suppression(self.event_type, self.suppress_for, now) {
                Some(count) => suppressed = count,
                None => return,
            }
        }

        let mut fields = TraceEventFields::new();
        fields.add_field("Severity", &(severity as i32).to_string());
        fields.add_field("Time", &format!("{now:.6}"));
        fields.add_field("Type", self.event_type);
        if let Some(id) = self.id {
            fields.add_field("ID", &id.to_string());
        }
        for (key, value) in self.details.drain(..) {
            fields.add_field(&key, &value);
        }
        if let Some(error) = &self.error {
            if error.is_injected_fault() {
                fields.add_field("ErrorIsInjectedFault", "1");
            }
            fields.add_field("Error", error.name());
            fields.add_field("ErrorDescription", error.what());
            fields.add_field("ErrorCode", &error.code().to_string());
        }
        if suppressed > 0 {
            fields.add_field("SuppressedEventCount", &suppressed.to_string());
        }

        if fields.size_bytes() > knobs.trace_event_max_size {
            let mut oversize = TraceEventFields::new();
            oversize.add_field("Severity", &(Severity::WarnAlways as i32).to_string());
            oversize.add_field("Time", &format!("{now:.6}"));
            oversize.add_field("Type", "EventSizeExceedsLimit");
            oversize.add_field("EventType", self.event_type);
            oversize.add_field("Size", &fields.size_bytes().to_string());
            log.write_event(oversize, None, false);
            return;
        }

        log.write_event(fields, self.track_latest.take(), severity == Severity::Error);
    }
}

impl Drop for TraceEvent {
    fn drop(&mut self) {
        self.commit_inner();
    }
}

/// Flush barriers shared with the writer thread. A barrier resolves when
/// the writer reaches it; a write error triggers every outstanding
/// barrier so flushers cannot hang.
#[derive(Default)]
struct BarrierList {
    barriers: Mutex<VecDeque<ThreadSafePromise<Void>>>,
}

impl BarrierList {
    fn push(&self, barrier: ThreadSafePromise<Void>) {
        self.barriers.lock().push_back(barrier);
    }

    fn pop(&self) {
        let mut barriers = self.barriers.lock();
        if let Some(front) = barriers.front() {
            front.try_send(Void);
        }
        barriers.pop_front();
    }

    fn trigger_all(&self) {
        for barrier in self.barriers.lock().iter() {
            barrier.try_send(Void);
        }
    }
}

/// The receiver owned by the dedicated writer thread.
struct TraceWriterThread {
    writer: FileTraceLogWriter,
    formatter: Box<dyn TraceFormatter + Send>,
    barriers: Arc<BarrierList>,
    sync_enabled: bool,
}

impl ThreadPoolReceiver for TraceWriterThread {}

impl TraceWriterThread {
    fn open_file(&mut self) {
        if self.writer.open().is_ok() {
            let header = self.formatter.header();
            self.writer.write(header);
        }
    }

    fn write_events(&mut self, events: Vec<TraceEventFields>) {
        for event in &events {
            let line = self.formatter.format_event(event);
            self.writer.write(&line);
        }
        if self.sync_enabled {
            self.writer.sync();
        }
    }

    fn roll_file(&mut self) {
        let footer = self.formatter.footer();
        self.writer.write(footer);
        self.writer.roll();
        let header = self.formatter.header();
        self.writer.write(header);
    }

    fn close_file(&mut self) {
        let footer = self.formatter.footer();
        self.writer.write(footer);
        self.writer.close();
    }
}

#[derive(Default)]
struct SuppressionInfo {
    end_time: f64,
    suppressed: u64,
}

struct LogState {
    opened: bool,
    buffer: Vec<TraceEventFields>,
    buffer_bytes: usize,
    logged_bytes: u64,
    preopen_overflow: u64,
    roll_size: u64,
    log_group: String,
    machine_id: Option<String>,
    pool: Option<ThreadPool<TraceWriterThread>>,
    latest: HashMap<String, TraceEventFields>,
    latest_error: Option<TraceEventFields>,
    suppression: HashMap<String, SuppressionInfo>,
}

/// Where a context's trace log writes.
#[derive(Debug, Clone)]
pub struct TraceLogOptions {
    /// Directory for trace files.
    pub directory: PathBuf,
    /// File name prefix; also the cleanup match key.
    pub process_name: String,
    /// Written into every event as `LogGroup`.
    pub log_group: String,
    /// Output format.
    pub format: TraceFormat,
    /// Roll threshold override; defaults to the knob.
    pub roll_size: Option<u64>,
    /// Directory budget override; defaults to the knob.
    pub max_logs_size: Option<u64>,
}

impl Default for TraceLogOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            process_name: "trace".to_string(),
            log_group: "default".to_string(),
            format: TraceFormat::default(),
            roll_size: None,
            max_logs_size: None,
        }
    }
}

/// A context's event pipeline.
pub struct TraceLog {
    knobs: Rc<Knobs>,
    state: Mutex<LogState>,
    barriers: Arc<BarrierList>,
}

fn annotate(fields: &mut TraceEventFields, machine_id: Option<&str>, log_group: &str) {
    if let Some(machine_id) = machine_id {
        fields.add_field("Machine", machine_id);
    }
    fields.add_field("LogGroup", log_group);
}

impl TraceLog {
    pub(crate) fn new(knobs: Rc<Knobs>) -> Self {
        Self {
            knobs,
            state: Mutex::new(LogState {
                opened: false,
                buffer: Vec::new(),
                buffer_bytes: 0,
                logged_bytes: 0,
                preopen_overflow: 0,
                roll_size: 0,
                log_group: String::new(),
                machine_id: None,
                pool: None,
                latest: HashMap::new(),
                latest_error: None,
                suppression: HashMap::new(),
            }),
            barriers: Arc::new(BarrierList::default()),
        }
    }

    /// True once a file is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().opened
    }

    /// Events buffered before the log opened and dropped for exceeding
    /// the pre-open byte budget.
    #[must_use]
    pub fn preopen_overflow_count(&self) -> u64 {
        self.state.lock().preopen_overflow
    }

    /// Latest committed event tracked under `key`.
    #[must_use]
    pub fn latest(&self, key: &str) -> Option<TraceEventFields> {
        self.state.lock().latest.get(key).cloned()
    }

    /// Latest committed `SevError` event.
    #[must_use]
    pub fn latest_error(&self) -> Option<TraceEventFields> {
        self.state.lock().latest_error.clone()
    }

    /// Every tracked latest event.
    #[must_use]
    pub fn all_latest(&self) -> Vec<TraceEventFields> {
        self.state.lock().latest.values().cloned().collect()
    }

    /// Number of events currently buffered on the network thread.
    #[must_use]
    pub fn buffered_events(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub(crate) fn write_event(
        &self,
        mut fields: TraceEventFields,
        track_latest: Option<String>,
        is_error: bool,
    ) {
        let mut state = self.state.lock();
        if state.opened {
            let machine_id = state.machine_id.clone();
            annotate(&mut fields, machine_id.as_deref(), &state.log_group);
        }
        if track_latest.is_some() {
            fields.add_field("TrackLatestType", "Original");
        }
        if !state.opened
            && (state.preopen_overflow > 0
                || state.buffer_bytes + fields.size_bytes() > self.knobs.trace_preopen_buffer_bytes)
        {
            state.preopen_overflow += 1;
            return;
        }
        state.buffer_bytes += fields.size_bytes();
        if is_error {
            state.latest_error = Some(fields.clone());
        }
        if let Some(key) = track_latest {
            state.latest.insert(key, fields.clone());
        }
        state.buffer.push(fields);
    }

    /// Consults the suppression window for `event_type`. Returns the
    /// number of duplicates dropped since the last emission, or `None`
    /// when this event should itself be dropped.
    pub(crate) fn check_suppression(
        &self,
        event_type: &str,
        duration: f64,
        now: f64,
    ) -> Option<u64> {
        let mut state = self.state.lock();
        if state.suppression.len() >= self.knobs.max_trace_suppressions {
            state.suppression.clear();
            let mut cleared = TraceEventFields::new();
            cleared.add_field("Severity", &(Severity::WarnAlways as i32).to_string());
            cleared.add_field("Time", &format!("{now:.6}"));
            cleared.add_field("Type", "ClearingTraceSuppressionMap");
            state.buffer_bytes += cleared.size_bytes();
            state.buffer.push(cleared);
        }
        let info = state.suppression.entry(event_type.to_string()).or_default();
        if info.end_time <= now {
            let suppressed = info.suppressed;
            info.end_time = now + duration;
            info.suppressed = 0;
            Some(suppressed)
        } else {
            info.suppressed += 1;
            None
        }
    }

    /// Opens the log: creates the writer thread, replays the pre-open
    /// buffer, and reports any pre-open overflow.
    pub(crate) fn open(&self, net: &Net, options: TraceLogOptions) -> Result<()> {
        let mut state = self.state.lock();
        assert!(!state.opened && state.pool.is_none(), "trace log already open");

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let basename = format!(
            "{}.{}.{}",
            options.process_name,
            timestamp,
            net.random_alphanumeric(6)
        );
        let barriers = Arc::clone(&self.barriers);
        let on_error: Arc<dyn Fn() + Send + Sync> = Arc::new(move || barriers.trigger_all());
        let writer = FileTraceLogWriter::new(
            options.directory.clone(),
            options.process_name.clone(),
            basename,
            options.format.extension(),
            options.max_logs_size.unwrap_or(self.knobs.trace_max_logs_size),
            on_error,
        );

        let pool = ThreadPool::new();
        pool.add_thread(TraceWriterThread {
            writer,
            formatter: options.format.formatter(),
            barriers: Arc::clone(&self.barriers),
            sync_enabled: self.knobs.trace_sync_enabled,
        });
        pool.post_fn(TraceWriterThread::open_file);

        state.machine_id = net.machine_state().machine_id;
        state.log_group = options.log_group;
        state.roll_size = options.roll_size.unwrap_or(self.knobs.trace_roll_size);
        state.pool = Some(pool);

        let machine_id = state.machine_id.clone();
        let log_group = state.log_group.clone();
        for fields in &mut state.buffer {
            annotate(fields, machine_id.as_deref(), &log_group);
        }
        state.opened = true;

        if state.preopen_overflow > 0 {
            let mut overflow = TraceEventFields::new();
            overflow.add_field("Severity", &(Severity::Warn as i32).to_string());
            overflow.add_field("Time", &format!("{:.6}", net.now()));
            overflow.add_field("Type", "TraceLogPreopenOverflow");
            overflow.add_field("OverflowEventCount", &state.preopen_overflow.to_string());
            annotate(&mut overflow, machine_id.as_deref(), &log_group);
            state.buffer_bytes += overflow.size_bytes();
            state.buffer.push(overflow);
            state.preopen_overflow = 0;
        }
        Ok(())
    }

    /// Hands the buffered events to the writer thread, rolling the file
    /// first when the size threshold is reached. The returned future
    /// resolves once everything posted before it is durably written.
    pub fn flush(&self, net: &Net) -> ThreadFuture<Void> {
        let (barrier, future) = threadsafe::channel();
        let mut state = self.state.lock();
        if !state.opened {
            barrier.send(Void);
            return future;
        }

        let events = std::mem::take(&mut state.buffer);
        let flushed_bytes = std::mem::take(&mut state.buffer_bytes) as u64;
        let roll = state.roll_size > 0 && state.logged_bytes + flushed_bytes > state.roll_size;
        state.logged_bytes += flushed_bytes;

        {
            let pool = state.pool.as_ref().expect("open log without a writer");
            if !events.is_empty() {
                pool.post_fn(move |w: &mut TraceWriterThread| w.write_events(events));
            }
            if roll {
                pool.post_fn(TraceWriterThread::roll_file);
            }
            self.barriers.push(barrier);
            pool.post_fn(|w: &mut TraceWriterThread| w.barriers.pop());
        }

        if roll {
            // Re-seed the fresh file with the tracked-latest snapshots so a
            // rolled log still carries the state crash reports need.
            let now = match net.clock_mode() {
                ClockMode::Cached => net.now(),
                ClockMode::Precise => net.precise_now(),
            };
            let snapshots: Vec<TraceEventFields> =
                state.latest.values().cloned().collect();
            for snapshot in snapshots {
                let mut rolled = TraceEventFields::new();
                for (key, value) in snapshot.iter() {
                    match key.as_str() {
                        "Time" => {
                            rolled.add_field("Time", &format!("{now:.6}"));
                            rolled.add_field("OriginalTime", value);
                        }
                        "TrackLatestType" => rolled.add_field("TrackLatestType", "Rolled"),
                        _ => rolled.add_field(key, value),
                    }
                }
                state.buffer_bytes += rolled.size_bytes();
                state.buffer.push(rolled);
            }
            state.logged_bytes = 0;
        }
        future
    }

    /// Flushes the remaining buffer, closes the file, and joins the
    /// writer thread.
    pub fn close(&self) {
        let pool = {
            let mut state = self.state.lock();
            if !state.opened {
                return;
            }
            let events = std::mem::take(&mut state.buffer);
            state.buffer_bytes = 0;
            state.opened = false;
            let pool = state.pool.take();
            if let Some(pool) = &pool {
                if !events.is_empty() {
                    pool.post_fn(move |w: &mut TraceWriterThread| w.write_events(events));
                }
                pool.post_fn(TraceWriterThread::close_file);
            }
            pool
        };
        if let Some(pool) = pool {
            pool.stop();
        }
    }
}

impl Drop for TraceLog {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the context's trace file and schedules the recurring flush
/// actor. The flush actor is uncancellable and stops with the context.
pub fn open_trace_file(net: &Net, options: TraceLogOptions) -> Result<()> {
    net.trace_log().open(net, options)?;
    let interval = net.knobs().trace_flush_interval;
    // Holds no context references: a captured handle would keep the
    // context alive from inside its own executor.
    let flush_loop = async move {
        loop {
            let timer = match Net::try_current() {
                Some(net) => net.delay_priority(interval, Priority::FLUSH_TRACE),
                None => break,
            };
            timer.await?;
            match Net::try_current() {
                Some(net) => drop(net.trace_log().flush(&net)),
                None => break,
            }
        }
        Ok(Void)
    };
    drop(net.spawn_uncancellable(flush_loop));
    Ok(())
}

/// A barrier over everything posted to the trace pipeline so far.
pub fn flush_trace(net: &Net) -> ThreadFuture<Void> {
    net.trace_log().flush(net)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_buffer_until_the_log_opens() {
        let net = Net::new();
        TraceEvent::new("Startup").detail("Step", 1).commit();
        TraceEvent::new("Startup").detail("Step", 2).commit();
        assert!(!net.trace_log().is_open());
        assert_eq!(net.trace_log().buffered_events(), 2);
    }

    #[test]
    fn severity_filter_drops_quiet_events() {
        let net = Net::new();
        TraceEvent::with_severity(Severity::Debug, "Chatter").commit();
        assert_eq!(net.trace_log().buffered_events(), 0);
    }

    #[test]
    fn cancelled_errors_are_not_reported_by_default() {
        let net = Net::new();
        TraceEvent::new("ActorEnd")
            .error(&Error::actor_cancelled())
            .commit();
        assert_eq!(net.trace_log().buffered_events(), 0);

        TraceEvent::new("ActorEnd")
            .error_allow_cancelled(&Error::actor_cancelled())
            .commit();
        assert_eq!(net.trace_log().buffered_events(), 1);
    }

    #[test]
    fn injected_faults_downgrade_sev_error() {
        let net = Net::new();
        let injected = Error::new(ErrorKind::ValueTooLarge).injected();
        TraceEvent::with_severity(Severity::Error, "IoFailure")
            .error(&injected)
            .track_latest("IoFailure")
            .commit();
        let fields = net.trace_log().latest("IoFailure").unwrap();
        assert_eq!(
            fields.get("Severity"),
            Some((Severity::WarnAlways as i32).to_string().as_str())
        );
        assert_eq!(fields.get("ErrorIsInjectedFault"), Some("1"));
        // A real SevError still lands in the error cache.
        TraceEvent::with_severity(Severity::Error, "IoFailure")
            .error(&Error::new(ErrorKind::ValueTooLarge))
            .commit();
        let latest_error = net.trace_log().latest_error().unwrap();
        assert_eq!(latest_error.get("Error"), Some("value_too_large"));
    }

    #[test]
    fn suppression_counts_duplicates() {
        let net = Net::new();
        for _ in 0..5 {
            TraceEvent::new("Noisy").suppress_for(10.0).commit();
        }
        // Only the first event of the window lands in the buffer.
        assert_eq!(net.trace_log().buffered_events(), 1);
        let log = net.trace_log();
        // Outside the window the counter is handed back.
        assert_eq!(log.check_suppression("Noisy", 10.0, 1e9), Some(4));
    }

    #[test]
    fn preopen_overflow_is_counted_not_buffered() {
        let mut knobs = Knobs::default();
        knobs.trace_preopen_buffer_bytes = 64;
        let net = Net::with_config(knobs, 1);
        for i in 0..16 {
            TraceEvent::new("Filler")
                .detail("Payload", "x".repeat(32))
                .detail("Seq", i)
                .commit();
        }
        let log = net.trace_log();
        assert!(log.preopen_overflow_count() > 0);
        assert!(log.buffered_events() < 16);
    }

    #[test]
    fn oversized_events_are_replaced() {
        let net = Net::new();
        TraceEvent::new("Big")
            .detail("Blob", "y".repeat(8_000))
            .commit();
        let log = net.trace_log();
        assert_eq!(log.buffered_events(), 1);
    }

    #[test]
    fn track_latest_keeps_the_most_recent() {
        let net = Net::new();
        TraceEvent::new("Role").detail("Seq", 1).track_latest("Role").commit();
        TraceEvent::new("Role").detail("Seq", 2).track_latest("Role").commit();
        let fields = net.trace_log().latest("Role").unwrap();
        assert_eq!(fields.get("Seq"), Some("2"));
        assert_eq!(fields.get("TrackLatestType"), Some("Original"));
        assert_eq!(net.trace_log().all_latest().len(), 1);
    }

    #[test]
    fn flush_before_open_resolves_immediately() {
        let net = Net::new();
        let barrier = flush_trace(&net);
        assert!(barrier.block().is_ok());
    }
}
