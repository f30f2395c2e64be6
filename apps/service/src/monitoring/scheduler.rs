use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use super::guards::ProbeGuards;
use crate::database::models::Monitor;

/// What the scheduler needs to know about a monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledMonitor {
    pub id: i64,
    pub target: String,
    pub interval: Duration,
}

impl From<&Monitor> for ScheduledMonitor {
    fn from(monitor: &Monitor) -> Self {
        Self {
            id: monitor.id,
            target: monitor.target.clone(),
            interval: Duration::from_secs(monitor.interval_seconds),
        }
    }
}

/// Runs one scheduled probe to completion, including recording its result
#[async_trait::async_trait]
pub trait ProbeDispatch: Send + Sync + 'static {
    async fn dispatch(&self, monitor: &ScheduledMonitor);
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on scheduled probes running at once
    pub max_concurrent_probes: usize,
    /// First fire of a newly scheduled monitor is delayed by up to this much
    pub startup_jitter: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_probes: 32,
            startup_jitter: Duration::ZERO,
        }
    }
}

enum Command {
    Upsert(ScheduledMonitor),
    Remove(i64),
    Shutdown,
}

/// Cheap handle for changing the schedule while the scheduler runs
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    /// Add a monitor, or change the target/interval of one already scheduled.
    ///
    /// An interval change applies from the next fire after the one already pending.
    pub fn schedule(&self, monitor: ScheduledMonitor) {
        if self.commands.send(Command::Upsert(monitor)).is_err() {
            warn!("Scheduler is not running, schedule request dropped");
        }
    }

    /// Stop future probes for a monitor for good. A probe already in flight
    /// completes, and later schedule requests for the same id are ignored.
    pub fn unschedule(&self, monitor_id: i64) {
        if self.commands.send(Command::Remove(monitor_id)).is_err() {
            warn!(monitor_id, "Scheduler is not running, unschedule request dropped");
        }
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

struct Entry {
    monitor: ScheduledMonitor,
    next_fire: Instant,
}

/// Monitoring scheduler - fires probes for every active monitor on its interval
///
/// A single driver task owns the schedule. Each due probe runs on its own
/// task, bounded by a shared semaphore; a monitor whose previous probe is
/// still in flight skips that fire instead of overlapping. On shutdown the
/// driver stops firing and waits for the probes it started.
pub struct MonitoringScheduler {
    dispatcher: Arc<dyn ProbeDispatch>,
    guards: ProbeGuards,
    limiter: Arc<Semaphore>,
    startup_jitter: Duration,
    entries: HashMap<i64, Entry>,
    /// Ids unscheduled at runtime; monitor ids are never reused
    removed: HashSet<i64>,
    in_flight: JoinSet<()>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl MonitoringScheduler {
    pub fn new(
        dispatcher: Arc<dyn ProbeDispatch>,
        guards: ProbeGuards,
        config: SchedulerConfig,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            dispatcher,
            guards,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_probes.max(1))),
            startup_jitter: config.startup_jitter,
            entries: HashMap::new(),
            removed: HashSet::new(),
            in_flight: JoinSet::new(),
            commands: rx,
        };

        (scheduler, SchedulerHandle { commands: tx })
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Monitoring scheduler started");

        loop {
            let deadline = self.entries.values().map(|entry| entry.next_fire).min();

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Upsert(monitor)) => self.upsert(monitor),
                    Some(Command::Remove(id)) => self.remove(id),
                    Some(Command::Shutdown) | None => break,
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    log_probe_exit(joined);
                }
                _ = wait_until(deadline) => self.fire_due(),
            }
        }

        let draining = self.in_flight.len();
        if draining > 0 {
            info!(draining, "Waiting for in-flight probes");
        }
        while let Some(joined) = self.in_flight.join_next().await {
            log_probe_exit(joined);
        }

        info!(pending = self.entries.len(), "Monitoring scheduler stopped");
    }

    fn upsert(&mut self, monitor: ScheduledMonitor) {
        if self.removed.contains(&monitor.id) {
            debug!(monitor_id = monitor.id, "Ignoring schedule request for removed monitor");
            return;
        }

        match self.entries.get_mut(&monitor.id) {
            Some(entry) => {
                debug!(monitor_id = monitor.id, interval = ?monitor.interval, "Monitor rescheduled");
                entry.monitor = monitor;
            }
            None => {
                let next_fire = Instant::now() + self.jitter();
                debug!(monitor_id = monitor.id, interval = ?monitor.interval, "Monitor scheduled");
                self.entries.insert(monitor.id, Entry { monitor, next_fire });
            }
        }
    }

    fn remove(&mut self, monitor_id: i64) {
        self.removed.insert(monitor_id);
        if self.entries.remove(&monitor_id).is_some() {
            self.guards.forget(monitor_id);
            debug!(monitor_id, "Monitor unscheduled");
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.startup_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }

    fn fire_due(&mut self) {
        let now = Instant::now();

        for entry in self.entries.values_mut() {
            if entry.next_fire > now {
                continue;
            }

            let monitor_id = entry.monitor.id;
            match self.guards.guard(monitor_id).try_lock_owned() {
                Ok(in_flight) => {
                    let dispatcher = self.dispatcher.clone();
                    let limiter = self.limiter.clone();
                    let monitor = entry.monitor.clone();

                    self.in_flight.spawn(async move {
                        let _in_flight = in_flight;
                        let Ok(_permit) = limiter.acquire_owned().await else {
                            return;
                        };
                        dispatcher.dispatch(&monitor).await;
                    });
                }
                Err(_) => {
                    debug!(monitor_id, "Previous probe still in flight, skipping this fire");
                }
            }

            entry.next_fire += entry.monitor.interval;
            if entry.next_fire <= now {
                entry.next_fire = now + entry.monitor.interval;
            }
        }
    }
}

fn log_probe_exit(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Probe task panicked: {}", e);
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records fire times and concurrency; each dispatch takes `busy_for`
    struct RecordingDispatch {
        start: Instant,
        busy_for: Duration,
        fired: Mutex<Vec<(i64, u64)>>,
        completed: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
        panics_for: Option<i64>,
    }

    impl RecordingDispatch {
        fn new(busy_for: Duration) -> Arc<Self> {
            Arc::new(Self {
                start: Instant::now(),
                busy_for,
                fired: Mutex::new(Vec::new()),
                completed: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                panics_for: None,
            })
        }

        fn fires_for(&self, id: i64) -> Vec<u64> {
            self.fired
                .lock()
                .unwrap()
                .iter()
                .filter(|(monitor, _)| *monitor == id)
                .map(|(_, at)| *at)
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl ProbeDispatch for RecordingDispatch {
        async fn dispatch(&self, monitor: &ScheduledMonitor) {
            self.fired
                .lock()
                .unwrap()
                .push((monitor.id, self.start.elapsed().as_secs()));
            if self.panics_for == Some(monitor.id) {
                panic!("probe blew up");
            }

            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(self.busy_for).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn monitor(id: i64, interval_secs: u64) -> ScheduledMonitor {
        ScheduledMonitor {
            id,
            target: format!("http://monitor-{id}.test"),
            interval: Duration::from_secs(interval_secs),
        }
    }

    fn start(dispatch: Arc<RecordingDispatch>, max_concurrent_probes: usize) -> SchedulerHandle {
        let config = SchedulerConfig {
            max_concurrent_probes,
            startup_jitter: Duration::ZERO,
        };
        let (scheduler, handle) = MonitoringScheduler::new(dispatch, ProbeGuards::new(), config);
        scheduler.spawn();
        handle
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_interval() {
        let dispatch = RecordingDispatch::new(Duration::ZERO);
        let handle = start(dispatch.clone(), 8);

        handle.schedule(monitor(1, 60));
        tokio::time::sleep(Duration::from_secs(181)).await;

        assert_eq!(dispatch.fires_for(1), vec![0, 60, 120, 180]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_never_overlaps_itself() {
        let dispatch = RecordingDispatch::new(Duration::from_secs(150));
        let handle = start(dispatch.clone(), 8);

        handle.schedule(monitor(1, 60));
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(dispatch.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(dispatch.fires_for(1), vec![0, 180, 360, 540]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unschedule_lets_in_flight_probe_finish() {
        let dispatch = RecordingDispatch::new(Duration::from_secs(30));
        let handle = start(dispatch.clone(), 8);

        handle.schedule(monitor(1, 60));
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.unschedule(1);
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(dispatch.fires_for(1), vec![0]);
        assert_eq!(dispatch.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_applies_after_pending_fire() {
        let dispatch = RecordingDispatch::new(Duration::ZERO);
        let handle = start(dispatch.clone(), 8);

        handle.schedule(monitor(1, 60));
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.schedule(monitor(1, 10));
        tokio::time::sleep(Duration::from_secs(75)).await;

        assert_eq!(dispatch.fires_for(1), vec![0, 60, 70, 80]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let dispatch = RecordingDispatch::new(Duration::from_secs(10));
        let handle = start(dispatch.clone(), 2);

        for id in 1..=4 {
            handle.schedule(monitor(id, 60));
        }
        tokio::time::sleep(Duration::from_secs(50)).await;

        assert_eq!(dispatch.max_running.load(Ordering::SeqCst), 2);
        assert_eq!(dispatch.completed.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_monitor_does_not_stop_others() {
        let dispatch = Arc::new(RecordingDispatch {
            panics_for: Some(1),
            ..Arc::into_inner(RecordingDispatch::new(Duration::ZERO)).unwrap()
        });
        let handle = start(dispatch.clone(), 8);

        handle.schedule(monitor(1, 60));
        handle.schedule(monitor(2, 60));
        tokio::time::sleep(Duration::from_secs(130)).await;

        assert_eq!(dispatch.fires_for(1), vec![0, 60, 120]);
        assert_eq!(dispatch.fires_for(2), vec![0, 60, 120]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_monitor_is_not_rescheduled() {
        let dispatch = RecordingDispatch::new(Duration::ZERO);
        let handle = start(dispatch.clone(), 8);

        handle.schedule(monitor(1, 60));
        tokio::time::sleep(Duration::from_secs(10)).await;
        // An edit that lost the race with the delete arrives last.
        handle.unschedule(1);
        handle.schedule(monitor(1, 30));
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(dispatch.fires_for(1), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_probes() {
        let dispatch = RecordingDispatch::new(Duration::from_secs(30));
        let config = SchedulerConfig::default();
        let (scheduler, handle) = MonitoringScheduler::new(dispatch.clone(), ProbeGuards::new(), config);
        let task = scheduler.spawn();

        handle.schedule(monitor(1, 60));
        handle.schedule(monitor(2, 60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.shutdown();
        task.await.unwrap();

        assert_eq!(dispatch.completed.load(Ordering::SeqCst), 2);
        assert_eq!(dispatch.running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_firing() {
        let dispatch = RecordingDispatch::new(Duration::ZERO);
        let config = SchedulerConfig::default();
        let (scheduler, handle) = MonitoringScheduler::new(dispatch.clone(), ProbeGuards::new(), config);
        let task = scheduler.spawn();

        handle.schedule(monitor(1, 60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.shutdown();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(dispatch.fires_for(1), vec![0]);
    }
}
