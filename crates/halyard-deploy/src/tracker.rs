//! The unit/machine tracker.
//!
//! An asynchronous view of which machine hosts which unit. The view is
//! seeded from one status snapshot, then a dedicated task consumes the
//! model watcher's delta stream and keeps it fresh. The apply loop
//! reads the view to answer two questions:
//!
//! - which machines currently host a service's units (idempotence
//!   checks), and
//! - which machine a given unit landed on (placement resolution) —
//!   blocking, with a deadline, until the stream has said so.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use halyard_api::{Delta, ModelWatcher};
use halyard_bundle::unit_service;

use crate::error::{DeployError, DeployResult};

struct Shared {
    /// unit name → machine id; empty while the assignment is unknown.
    units: Mutex<HashMap<String, String>>,
    changed: Notify,
    stopped: AtomicBool,
}

/// Handle to the tracking task. [`UnitTracker::stop`] shuts the task
/// down and waits for the watcher to be released; merely dropping the
/// handle still signals shutdown, so a cancelled deployment does not
/// leave the task consuming the stream.
pub struct UnitTracker {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl UnitTracker {
    /// Spawn the tracking task over a freshly acquired watcher.
    pub fn start(
        mut watcher: Box<dyn ModelWatcher>,
        seed: HashMap<String, String>,
    ) -> UnitTracker {
        let shared = Arc::new(Shared {
            units: Mutex::new(seed),
            changed: Notify::new(),
            stopped: AtomicBool::new(false),
        });
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    batch = watcher.next() => match batch {
                        Ok(deltas) => {
                            let mut units = task_shared.units.lock().await;
                            for delta in deltas {
                                if let Delta::Unit { name, machine } = delta {
                                    debug!(unit = %name, machine = %machine, "unit delta");
                                    units.insert(name, machine);
                                }
                            }
                            drop(units);
                            task_shared.changed.notify_waiters();
                        }
                        Err(err) => {
                            warn!(error = %err, "model watcher failed");
                            break;
                        }
                    }
                }
            }
            task_shared.stopped.store(true, Ordering::SeqCst);
            task_shared.changed.notify_waiters();
            if let Err(err) = watcher.stop().await {
                debug!(error = %err, "stopping model watcher");
            }
        });
        UnitTracker {
            shared,
            shutdown,
            task: Some(task),
        }
    }

    /// Record a unit assignment observed directly by the apply loop.
    /// The machine may be empty, meaning the unit exists but its
    /// machine is not known yet; an assignment the stream has already
    /// delivered is never downgraded back to unknown.
    pub async fn record(&self, unit: &str, machine: &str) {
        let mut units = self.shared.units.lock().await;
        let entry = units.entry(unit.to_string()).or_default();
        if !machine.is_empty() || entry.is_empty() {
            *entry = machine.to_string();
        }
        drop(units);
        self.shared.changed.notify_waiters();
    }

    /// Ids of the machines hosting the given service's units, sorted.
    /// Units without a known machine contribute an empty entry, so the
    /// length always equals the unit count.
    pub async fn machines_for_service(&self, service: &str) -> Vec<String> {
        let units = self.shared.units.lock().await;
        let mut machines: Vec<String> = units
            .iter()
            .filter(|(unit, _)| unit_service(unit) == Some(service))
            .map(|(_, machine)| machine.clone())
            .collect();
        machines.sort();
        machines
    }

    /// Block until the stream has assigned a machine to `unit`.
    pub async fn wait_for_unit(&self, unit: &str, deadline: Duration) -> DeployResult<String> {
        let wait = async {
            loop {
                let notified = self.shared.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                {
                    let units = self.shared.units.lock().await;
                    if let Some(machine) = units.get(unit).filter(|m| !m.is_empty()) {
                        return Ok(machine.clone());
                    }
                }
                if self.shared.stopped.load(Ordering::SeqCst) {
                    return Err(DeployError::WatcherStopped);
                }
                notified.await;
            }
        };
        match tokio::time::timeout(deadline, wait).await {
            Ok(result) => result,
            Err(_) => Err(DeployError::WaitUnit {
                unit: unit.to_string(),
            }),
        }
    }

    /// Stop the tracking task and wait for the watcher to be released.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for UnitTracker {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
