use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agj::{
    AgentInstance, AgentServing, AgjError, HealthStatus, PermissionTransition,
    PermissionTransitionDetector, CAPTURE_LINES,
};
use crate::exec::CommandError;
use crate::settings::RefreshInterval;

/// Receives the agents that started prompting during one poll
pub type NotificationHandler = Arc<dyn Fn(Vec<PermissionTransition>) + Send + Sync>;

/// Read-only view published to observers after every state change
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub instances: Vec<AgentInstance>,
    pub health: HealthStatus,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_refreshing: bool,
}

#[derive(Default)]
struct StoreState {
    instances: Vec<AgentInstance>,
    health: HealthStatus,
    last_updated: Option<DateTime<Utc>>,
    /// Last seen prompt state per session key
    permission_state: HashMap<String, bool>,
    /// Captured terminal output per instance id
    output_cache: HashMap<i64, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopSignal {
    Run,
    /// Replaced by a new loop; an in-flight refresh still applies
    Restart,
    /// Store stopped; an in-flight listing is discarded
    Stop,
}

struct RefreshLoop {
    signal: watch::Sender<LoopSignal>,
    handle: JoinHandle<()>,
}

/// Owns the agent list and polls agj on an interval
///
/// All mutation goes through the store. Observers get immutable
/// [`StoreSnapshot`]s from [`subscribe`](Self::subscribe), and new
/// permission prompts are handed to the notification handler.
pub struct AgentStore {
    client: Arc<dyn AgentServing>,
    state: RwLock<StoreState>,
    is_refreshing: AtomicBool,
    interval: Mutex<RefreshInterval>,
    /// Overrides the sleep between polls; tests only
    poll_period: Option<Duration>,
    notification_handler: RwLock<Option<NotificationHandler>>,
    updates: watch::Sender<StoreSnapshot>,
    refresh_loop: Mutex<Option<RefreshLoop>>,
}

/// Clears the in-flight flag even if the refresh future is dropped
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AgentStore {
    pub fn new(client: Arc<dyn AgentServing>, interval: RefreshInterval) -> Self {
        let (updates, _) = watch::channel(StoreSnapshot::default());
        Self {
            client,
            state: RwLock::new(StoreState::default()),
            is_refreshing: AtomicBool::new(false),
            interval: Mutex::new(interval),
            poll_period: None,
            notification_handler: RwLock::new(None),
            updates,
            refresh_loop: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_poll_period(client: Arc<dyn AgentServing>, period: Duration) -> Self {
        let mut store = Self::new(client, RefreshInterval::ThreeSeconds);
        store.poll_period = Some(period);
        store
    }

    pub fn set_notification_handler<F>(&self, handler: F)
    where
        F: Fn(Vec<PermissionTransition>) + Send + Sync + 'static,
    {
        *self.notification_handler.write() = Some(Arc::new(handler));
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read();
        StoreSnapshot {
            instances: state.instances.clone(),
            health: state.health.clone(),
            last_updated: state.last_updated,
            is_refreshing: self.is_refreshing(),
        }
    }

    pub fn instances(&self) -> Vec<AgentInstance> {
        self.state.read().instances.clone()
    }

    pub fn health(&self) -> HealthStatus {
        self.state.read().health.clone()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_updated
    }

    pub fn is_refreshing(&self) -> bool {
        self.is_refreshing.load(Ordering::Acquire)
    }

    pub fn permission_state(&self) -> HashMap<String, bool> {
        self.state.read().permission_state.clone()
    }

    /// Last captured output (or capture error) for an instance
    pub fn output(&self, instance: &AgentInstance) -> Option<String> {
        self.state.read().output_cache.get(&instance.id).cloned()
    }

    pub fn instance_by_id(&self, id: i64) -> Option<AgentInstance> {
        self.state.read().instances.iter().find(|i| i.id == id).cloned()
    }

    pub fn instance_by_session_id(&self, session_id: &str) -> Option<AgentInstance> {
        self.state
            .read()
            .instances
            .iter()
            .find(|i| i.session_id() == Some(session_id))
            .cloned()
    }

    pub fn refresh_interval(&self) -> RefreshInterval {
        *self.interval.lock()
    }

    fn poll_period(&self) -> Duration {
        self.poll_period
            .unwrap_or_else(|| self.refresh_interval().duration())
    }

    /// Poll agj once
    ///
    /// Does nothing if a refresh is already running. Failures never
    /// propagate; they are recorded in [`health`](Self::health) and the
    /// previous instance list is kept.
    pub async fn refresh(&self) {
        self.refresh_with_signal(None).await;
    }

    async fn refresh_with_signal(&self, signal: Option<&watch::Receiver<LoopSignal>>) {
        if self
            .is_refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in flight, skipping");
            return;
        }
        let guard = RefreshGuard(&self.is_refreshing);

        let result = self.client.list_instances().await;

        let stopped = signal.is_some_and(|rx| *rx.borrow() == LoopSignal::Stop);
        let events = if stopped {
            debug!("Store stopped during refresh, discarding result");
            Vec::new()
        } else {
            self.apply_listing(result)
        };

        if !events.is_empty() {
            let handler = self.notification_handler.read().clone();
            if let Some(handler) = handler {
                handler(events);
            }
        }

        drop(guard);
        self.publish();
    }

    fn apply_listing(&self, result: Result<Vec<AgentInstance>, AgjError>) -> Vec<PermissionTransition> {
        let mut state = self.state.write();

        match result {
            Ok(instances) => {
                let transitions =
                    PermissionTransitionDetector::transitions(&instances, &state.permission_state);

                if !state.health.is_healthy() {
                    info!("agj is reachable again");
                }
                debug!(
                    instances = instances.len(),
                    new_prompts = transitions.events.len(),
                    "Refreshed agent list"
                );

                state.instances = instances;
                state.last_updated = Some(Utc::now());
                state.health = HealthStatus::Healthy;
                state.permission_state = transitions.current;
                transitions.events
            }
            Err(e) => {
                let health = health_for_error(&e);
                if health != state.health {
                    warn!(error = %e, "Refresh failed");
                } else {
                    debug!(error = %e, "Refresh failed again");
                }
                state.health = health;
                Vec::new()
            }
        }
    }

    /// Capture recent output for an instance into the output cache
    ///
    /// Failures are stored as the cached text.
    pub async fn fetch_output(&self, instance: &AgentInstance) {
        let text = match self.client.capture_output(instance, Some(CAPTURE_LINES)).await {
            Ok(output) => output,
            Err(e) => {
                debug!(id = instance.id, error = %e, "Capture failed");
                format!("Failed to capture output: {}", e)
            }
        };

        self.state.write().output_cache.insert(instance.id, text);
        self.publish();
    }

    /// Bring the instance's terminal session to the front
    pub async fn focus(&self, instance: &AgentInstance) -> Result<(), AgjError> {
        self.client.focus(instance).await
    }

    /// Start polling, replacing any running loop
    pub fn start(self: &Arc<Self>) {
        self.restart_loop();
    }

    /// Stop polling
    ///
    /// A subprocess already running for the current poll is left to finish;
    /// its listing is ignored.
    pub fn stop(&self) {
        if let Some(running) = self.refresh_loop.lock().take() {
            let _ = running.signal.send(LoopSignal::Stop);
            info!("Refresh loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.refresh_loop
            .lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Change the polling interval, restarting the loop if it is running
    pub fn set_refresh_interval(self: &Arc<Self>, interval: RefreshInterval) {
        {
            let mut current = self.interval.lock();
            if *current == interval {
                return;
            }
            *current = interval;
        }
        info!(seconds = interval.seconds(), "Refresh interval changed");

        if self.refresh_loop.lock().is_some() {
            self.restart_loop();
        }
    }

    fn restart_loop(self: &Arc<Self>) {
        let mut slot = self.refresh_loop.lock();
        if let Some(previous) = slot.take() {
            let _ = previous.signal.send(LoopSignal::Restart);
        }

        let (signal, rx) = watch::channel(LoopSignal::Run);
        let handle = tokio::spawn(run_loop(Arc::downgrade(self), rx));
        *slot = Some(RefreshLoop { signal, handle });
        debug!(seconds = self.refresh_interval().seconds(), "Refresh loop started");
    }

    fn publish(&self) {
        self.updates.send_replace(self.snapshot());
    }
}

impl Drop for AgentStore {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Refresh, sleep, repeat until signalled
///
/// Holds only a weak reference between iterations so a dropped store ends
/// the loop.
async fn run_loop(store: Weak<AgentStore>, mut signal: watch::Receiver<LoopSignal>) {
    loop {
        if *signal.borrow() != LoopSignal::Run {
            break;
        }
        let Some(this) = store.upgrade() else {
            break;
        };

        this.refresh_with_signal(Some(&signal)).await;
        let interval = this.poll_period();
        drop(this);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = signal.changed() => break,
        }
    }
}

fn health_for_error(error: &AgjError) -> HealthStatus {
    match error {
        AgjError::Command(CommandError::BinaryNotFound(detail))
        | AgjError::Command(CommandError::NotExecutable(detail)) => {
            HealthStatus::AgjMissing(detail.clone())
        }
        AgjError::Command(CommandError::RunFailed(detail)) => HealthStatus::Error(detail.clone()),
        AgjError::BackendUnavailable => HealthStatus::BackendUnavailable,
        AgjError::CommandFailed(detail) => HealthStatus::Error(detail.clone()),
        AgjError::DecodeFailed => HealthStatus::Error(error.to_string()),
    }
}
