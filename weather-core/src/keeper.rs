//! Per-location poller that republishes a snapshot only when its content
//! changes.
//!
//! A [`WeatherKeeper`] owns one tokio task. The task sleeps for the configured
//! interval, fetches the locality snapshot, compares its [`ContentHash`] with
//! the last one it saw and broadcasts a [`KeeperEvent::New`] on change. The
//! next sleep starts only after the fetch resolves, so cycles never overlap.
//!
//! Stopping is cooperative. [`WeatherKeeper::stop`] flips a flag that wakes a
//! sleeping task, which then exits without fetching. A fetch that is already
//! in flight is not aborted and may still emit its result; nothing is emitted
//! after that.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{Geoid, LocalitySource, Snapshot};
use crate::config::KeeperConfig;
use crate::error::WeatherError;
use crate::hash::ContentHash;

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum KeeperEvent {
    New {
        geoid: Geoid,
        hash: ContentHash,
        snapshot: Arc<Snapshot>,
        observed_at: DateTime<Utc>,
    },
}

impl KeeperEvent {
    pub fn geoid(&self) -> Geoid {
        match self {
            KeeperEvent::New { geoid, .. } => *geoid,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        match self {
            KeeperEvent::New { snapshot, .. } => snapshot,
        }
    }
}

/// Dedup memory of a keeper: the hash of the last snapshot it emitted.
#[derive(Debug, Clone, Default)]
pub struct KeeperState {
    last_hash: Option<ContentHash>,
}

impl KeeperState {
    pub fn last_hash(&self) -> Option<ContentHash> {
        self.last_hash
    }

    /// Records `snapshot` and returns its hash if it differs from the last one.
    /// The first snapshot ever observed always counts as changed.
    pub fn observe(&mut self, snapshot: &Snapshot) -> Result<Option<ContentHash>, WeatherError> {
        let hash = ContentHash::of(snapshot)?;
        if self.last_hash == Some(hash) {
            return Ok(None);
        }
        self.last_hash = Some(hash);
        Ok(Some(hash))
    }
}

/// Runs a single fetch-compare cycle without any scheduling.
///
/// Returns `Ok(None)` when the snapshot is unchanged. A fetch error leaves
/// `state` untouched.
pub async fn sync_once<S>(
    source: &S,
    geoid: Geoid,
    state: &mut KeeperState,
) -> Result<Option<KeeperEvent>, WeatherError>
where
    S: LocalitySource + ?Sized,
{
    let snapshot = source.locality_info(geoid).await?;
    match state.observe(&snapshot)? {
        Some(hash) => {
            info!(geoid, hash = %hash, "new weather snapshot");
            Ok(Some(KeeperEvent::New {
                geoid,
                hash,
                snapshot: Arc::new(snapshot),
                observed_at: Utc::now(),
            }))
        }
        None => {
            debug!(geoid, "weather unchanged");
            Ok(None)
        }
    }
}

/// Handle to a running keeper task.
///
/// Dropping the handle detaches the task; it keeps polling until the runtime
/// shuts down. Call [`stop`](Self::stop) or [`shutdown`](Self::shutdown) to
/// end it.
pub struct WeatherKeeper {
    geoid: Geoid,
    interval: Duration,
    active: watch::Sender<bool>,
    events: broadcast::Sender<KeeperEvent>,
    join: JoinHandle<()>,
}

impl WeatherKeeper {
    /// Starts polling `geoid`. The first fetch happens one interval from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(source: Arc<dyn LocalitySource>, geoid: Geoid, config: KeeperConfig) -> Self {
        let interval = config.interval();
        let (active, active_rx) = watch::channel(true);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let join = tokio::spawn(run(source, geoid, interval, active_rx, events.clone()));

        Self {
            geoid,
            interval,
            active,
            events,
            join,
        }
    }

    pub fn with_interval(
        source: Arc<dyn LocalitySource>,
        geoid: Geoid,
        interval: Duration,
    ) -> Self {
        Self::spawn(source, geoid, KeeperConfig::with_interval(interval))
    }

    pub fn geoid(&self) -> Geoid {
        self.geoid
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Registers a new subscriber. It sees every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<KeeperEvent> {
        self.events.subscribe()
    }

    /// Asks the keeper to stop. Idempotent.
    pub fn stop(&self) {
        if self.active.send_replace(false) {
            debug!(geoid = self.geoid, "keeper stop requested");
        }
    }

    /// Stops the keeper and waits for its task to finish, including any
    /// in-flight fetch.
    pub async fn shutdown(self) -> Result<(), WeatherError> {
        self.stop();
        self.join.await.map_err(WeatherError::from)
    }
}

async fn run(
    source: Arc<dyn LocalitySource>,
    geoid: Geoid,
    interval: Duration,
    mut active: watch::Receiver<bool>,
    events: broadcast::Sender<KeeperEvent>,
) {
    info!(geoid, interval_ms = interval.as_millis() as u64, "keeper started");
    let mut state = KeeperState::default();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stopped(&mut active) => {}
        }
        if !*active.borrow() {
            break;
        }

        match sync_once(&*source, geoid, &mut state).await {
            Ok(Some(event)) => {
                if events.send(event).is_err() {
                    debug!(geoid, "no subscribers for new snapshot");
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(geoid, error = %err, "failed to sync weather");
            }
        }

        if !*active.borrow() {
            break;
        }
    }

    info!(geoid, "keeper stopped");
}

async fn stopped(active: &mut watch::Receiver<bool>) {
    if active.wait_for(|is_active| !*is_active).await.is_err() {
        // Handle dropped without stop(); the flag can never change now.
        std::future::pending::<()>().await;
    }
}
