// Event trigger and single-flight reconciler.
// The watcher turns Docker events and resync ticks into triggers; a single reconciler task
// consumes them, so at most one pass touches tc state at a time.

use crate::discovery::Discovery;
use crate::docker_repo::ContainerRuntime;
use crate::models::{PassOutcome, PassReport, StatusSnapshot, short_id};
use crate::tc::TcInstaller;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::{Duration, interval, sleep};
use tracing::{debug, info, warn};

/// Handle for requesting a reconciliation pass. At most one request is ever pending;
/// requests made while one is pending are coalesced into it.
#[derive(Clone)]
pub struct Trigger(mpsc::Sender<()>);

impl Trigger {
    /// Returns false when the request was coalesced into a pending one (or the reconciler is gone).
    pub fn fire(&self) -> bool {
        self.0.try_send(()).is_ok()
    }
}

pub fn trigger_channel() -> (Trigger, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (Trigger(tx), rx)
}

/// Last pass report and pass counter, shared with the status API.
#[derive(Default)]
pub struct StatusBoard {
    inner: RwLock<StatusSnapshot>,
}

impl StatusBoard {
    pub async fn record(&self, report: PassReport) {
        let mut s = self.inner.write().await;
        s.passes_total += 1;
        s.last_pass = Some(report);
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().await.clone()
    }
}

/// Enumerates the running set and shapes every record, one record at a time.
pub struct Reconciler {
    discovery: Discovery,
    installer: TcInstaller,
    status: Arc<StatusBoard>,
}

impl Reconciler {
    pub fn new(discovery: Discovery, installer: TcInstaller, status: Arc<StatusBoard>) -> Self {
        Self {
            discovery,
            installer,
            status,
        }
    }

    /// One full pass. Install failures are counted and logged; the pass carries on.
    pub async fn run_pass(&self) -> PassReport {
        let started_at_ms = now_ms();
        let report = match self.discovery.list_eligible_containers().await {
            Err(e) => {
                warn!(
                    error = %e,
                    operation = "list_eligible_containers",
                    "reconciliation pass failed"
                );
                PassReport {
                    started_at_ms,
                    finished_at_ms: now_ms(),
                    outcome: PassOutcome::Failed,
                    records: 0,
                    shaped: 0,
                    failed: 0,
                    error: Some(e.to_string()),
                }
            }
            Ok(records) => {
                let mut shaped = 0;
                let mut failed = 0;
                let mut last_error = None;
                for record in &records {
                    match self.installer.install_shaping(record).await {
                        Ok(()) => shaped += 1,
                        Err(e) => {
                            failed += 1;
                            warn!(
                                container_id = %record.id,
                                name = %record.name,
                                side = ?e.side(),
                                error = %e,
                                operation = "install_shaping",
                                "shaping failed"
                            );
                            last_error = Some(e.to_string());
                        }
                    }
                }
                let pruned = self.discovery.prune_links(&records).await;
                if pruned > 0 {
                    debug!(pruned, "pruned stale netns links");
                }
                PassReport {
                    started_at_ms,
                    finished_at_ms: now_ms(),
                    outcome: PassOutcome::Ok,
                    records: records.len(),
                    shaped,
                    failed,
                    error: last_error,
                }
            }
        };
        info!(
            outcome = ?report.outcome,
            records = report.records,
            shaped = report.shaped,
            failed = report.failed,
            elapsed_ms = report.finished_at_ms.saturating_sub(report.started_at_ms),
            "reconciliation pass"
        );
        self.status.record(report.clone()).await;
        report
    }
}

/// Spawns the reconciler. It exits once every Trigger has been dropped and the last pass is done.
pub fn spawn_reconciler(
    reconciler: Arc<Reconciler>,
    mut trigger_rx: mpsc::Receiver<()>,
    debounce: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while trigger_rx.recv().await.is_some() {
            if !debounce.is_zero() {
                sleep(debounce).await;
            }
            // Anything that arrived during the quiet period is covered by this pass.
            while trigger_rx.try_recv().is_ok() {}
            reconciler.run_pass().await;
        }
        debug!("Reconciler shutting down");
    })
}

pub struct WatcherDeps {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub trigger: Trigger,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub struct WatcherConfig {
    pub resync_interval: Duration,
    pub event_retry: Duration,
}

/// Spawns the event watcher: one trigger at startup, one per matching Docker event, one per
/// resync tick, and one after every resubscription (events may have been missed meanwhile).
pub fn spawn_event_watcher(deps: WatcherDeps, config: WatcherConfig) -> tokio::task::JoinHandle<()> {
    let WatcherDeps {
        runtime,
        trigger,
        mut shutdown_rx,
    } = deps;

    tokio::spawn(async move {
        trigger.fire();

        let mut resync = interval(config.resync_interval);
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately; the startup trigger already covers it.
        resync.tick().await;

        let mut events = runtime.events();
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("Event watcher shutting down");
                    break;
                }
                _ = resync.tick() => {
                    debug!(operation = "resync", "periodic resync");
                    trigger.fire();
                }
                next = events.next() => {
                    match next {
                        Some(Ok(ev)) => {
                            debug!(container_id = %short_id(&ev.id), action = %ev.action, "container event");
                            trigger.fire();
                            continue;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, operation = "docker_events", "event stream failed; resubscribing");
                        }
                        None => {
                            warn!(operation = "docker_events", "event stream ended; resubscribing");
                        }
                    }
                    tokio::select! {
                        _ = &mut shutdown_rx => {
                            debug!("Event watcher shutting down");
                            break;
                        }
                        _ = sleep(config.event_retry) => {}
                    }
                    events = runtime.events();
                    trigger.fire();
                }
            }
        }
    })
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
