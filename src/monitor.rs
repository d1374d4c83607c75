//! Machine-state telemetry.
//!
//! A [`MachineState`] names where the process runs; it is installed into
//! the runtime context by copying its public fields. [`SystemMonitor`]
//! periodically snapshots loop counters into a `ProcessMetrics` trace
//! event kept in the latest-event cache for crash reports.

use crate::runtime::Net;
use crate::trace::{Severity, TraceEvent};
use std::cell::Cell;

/// Identity of the machine a context runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineState {
    /// Stable machine identifier.
    pub machine_id: Option<String>,
    /// Failure-domain zone.
    pub zone_id: Option<String>,
    /// Datacenter identifier.
    pub datacenter_id: Option<String>,
}

/// Emits periodic `ProcessMetrics` events from loop statistics.
#[derive(Debug)]
pub struct SystemMonitor {
    last_time: Cell<f64>,
    last_tasks: Cell<u64>,
    last_timers: Cell<u64>,
}

impl SystemMonitor {
    /// Starts a monitoring window at the context's current time.
    #[must_use]
    pub fn new(net: &Net) -> Self {
        Self {
            last_time: Cell::new(net.now()),
            last_tasks: Cell::new(net.tasks_executed()),
            last_timers: Cell::new(net.timers_fired()),
        }
    }

    /// Emits one `ProcessMetrics` event covering the window since the
    /// previous emission.
    pub fn emit(&self, net: &Net) {
        let now = net.now();
        let elapsed = now - self.last_time.get();
        let tasks = net.tasks_executed();
        let timers = net.timers_fired();
        let machine = net.machine_state();

        let mut event = TraceEvent::with_severity(Severity::Info, "ProcessMetrics")
            .detail("Elapsed", format!("{elapsed:.6}"))
            .detail("TasksExecuted", tasks - self.last_tasks.get())
            .detail("TimersFired", timers - self.last_timers.get())
            .detail("LoopTurns", net.loop_turns())
            .detail("MaxTaskLatency", format!("{:.6}", net.max_task_latency()))
            .detail("ResidentTasks", net.task_count());
        if let Some(machine_id) = machine.machine_id {
            event = event.detail("MachineId", machine_id);
        }
        if let Some(zone_id) = machine.zone_id {
            event = event.detail("ZoneId", zone_id);
        }
        if let Some(datacenter_id) = machine.datacenter_id {
            event = event.detail("DatacenterId", datacenter_id);
        }
        event.track_latest("ProcessMetrics").commit();

        self.last_time.set(now);
        self.last_tasks.set(tasks);
        self.last_timers.set(timers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_state_is_copied_into_the_context() {
        let thread = std::thread::spawn(|| {
            let net = Net::new();
            let state = MachineState {
                machine_id: Some("m-1".into()),
                zone_id: Some("z-1".into()),
                datacenter_id: None,
            };
            net.init_machine_state(state.clone());
            assert_eq!(net.machine_state(), state);
        });
        thread.join().unwrap();
    }

    #[test]
    fn monitor_tracks_the_latest_snapshot() {
        let thread = std::thread::spawn(|| {
            let net = Net::new();
            let monitor = SystemMonitor::new(&net);
            monitor.emit(&net);
            let snapshot = net
                .trace_log()
                .latest("ProcessMetrics")
                .expect("snapshot missing");
            assert_eq!(snapshot.get("Type"), Some("ProcessMetrics"));
            assert!(snapshot.get("Elapsed").is_some());
        });
        thread.join().unwrap();
    }
}
