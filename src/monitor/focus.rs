//! Focus change monitoring.
//!
//! Polls a [`WindowSource`], classifies each observation and emits an
//! app-focus event only when the identified application differs from the
//! last one emitted.

use crate::collector::{WindowObservation, WindowSource};
use crate::delivery::{DeliveryBuffer, TelemetryEvent};
use crate::notify::{ListenerId, Listeners};
use crate::signatures::AppIdentifier;
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pushed to subscribers whenever the focused application changes.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusChange {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub app_id: String,
    /// Application emitted before this one, `None` for the first of a run.
    pub previous_app: Option<String>,
    pub observation: WindowObservation,
}

#[derive(Default)]
struct Tracked {
    /// Bumped on every stop so cycles of a finished run cannot emit.
    run: u64,
    last_app: Option<String>,
    last_observation: Option<WindowObservation>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared {
    source: Arc<dyn WindowSource>,
    identifier: Arc<AppIdentifier>,
    buffer: DeliveryBuffer,
    listeners: Listeners<FocusChange>,
    transparency: Option<SharedTransparencyLog>,
    tracked: Mutex<Tracked>,
}

impl Shared {
    fn tracked(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn cycle(&self, session_id: &str, run: u64) {
        let observation = match self.source.observe().await {
            Ok(Some(observation)) => observation,
            Ok(None) => {
                debug!(source = self.source.name(), "no window observed");
                return;
            }
            Err(e) => {
                warn!(source = self.source.name(), "window observation failed: {e}");
                return;
            }
        };

        let app_id = self.identifier.identify(&observation);

        let change = {
            let mut tracked = self.tracked();
            if tracked.run != run || tracked.last_app.as_deref() == Some(app_id) {
                return;
            }
            let previous_app = tracked.last_app.replace(app_id.to_string());
            tracked.last_observation = Some(observation.clone());
            FocusChange {
                session_id: session_id.to_string(),
                timestamp: Utc::now(),
                app_id: app_id.to_string(),
                previous_app,
                observation,
            }
        };

        info!(app = %change.app_id, previous = ?change.previous_app, "focus changed");

        let event = TelemetryEvent::app_focus(session_id, app_id);
        if !self.buffer.add_event(event) {
            warn!(app = %change.app_id, "focus event rejected by delivery buffer");
        }
        if let Some(log) = &self.transparency {
            log.record_focus_event();
        }
        self.listeners.emit(&change);
    }
}

async fn poll_loop(
    shared: Arc<Shared>,
    session_id: String,
    interval: Duration,
    run: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => shared.cycle(&session_id, run).await,
            _ = cancel.cancelled() => {
                debug!(session = %session_id, "focus monitor loop shutting down");
                break;
            }
        }
    }
}

/// Polls the focused window and feeds app-focus events into a buffer.
///
/// Two states: stopped and running. The first cycle of a run happens
/// immediately and always emits, because the last-emitted app is cleared on
/// every stop.
pub struct FocusMonitor {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl FocusMonitor {
    pub fn new(
        source: Arc<dyn WindowSource>,
        identifier: Arc<AppIdentifier>,
        buffer: DeliveryBuffer,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                identifier,
                buffer,
                listeners: Listeners::new("focus"),
                transparency: None,
                tracked: Mutex::new(Tracked::default()),
            }),
            running: Mutex::new(None),
        }
    }

    /// Count emitted focus changes in `log`. Must be called before `start`.
    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.transparency = Some(log);
        }
        self
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start polling every `poll_interval`. Returns `false` (and does
    /// nothing) if the monitor is already running or the interval is zero.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, session_id: impl Into<String>, poll_interval: Duration) -> bool {
        let session_id = session_id.into();
        if poll_interval.is_zero() {
            warn!(session = %session_id, "refusing to start focus monitor with a zero poll interval");
            return false;
        }
        let mut running = self.running();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            info!(session = %session_id, "focus monitor already running");
            return false;
        }

        let run = self.shared.tracked().run;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.shared.clone(),
            session_id.clone(),
            poll_interval,
            run,
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });

        info!(
            session = %session_id,
            interval_ms = poll_interval.as_millis() as u64,
            "focus monitor started"
        );
        true
    }

    /// Stop polling and forget the last emitted app. Returns whether the
    /// monitor was running.
    pub fn stop(&self) -> bool {
        let stopped = match self.running().take() {
            Some(running) => {
                running.cancel.cancel();
                running.handle.abort();
                true
            }
            None => false,
        };

        let mut tracked = self.shared.tracked();
        tracked.run += 1;
        tracked.last_app = None;
        tracked.last_observation = None;

        if stopped {
            info!("focus monitor stopped");
        }
        stopped
    }

    /// Stop and drop every subscriber.
    pub fn dispose(&self) {
        self.stop();
        self.shared.listeners.clear();
    }

    pub fn is_running(&self) -> bool {
        self.running()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Application most recently emitted in the current run.
    pub fn current_app(&self) -> Option<String> {
        self.shared.tracked().last_app.clone()
    }

    pub fn last_observation(&self) -> Option<WindowObservation> {
        self.shared.tracked().last_observation.clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&FocusChange) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.listeners.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.listeners.unsubscribe(id)
    }
}

impl Drop for FocusMonitor {
    fn drop(&mut self) {
        if let Some(running) = self.running().take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}
