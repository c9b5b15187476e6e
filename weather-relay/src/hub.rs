use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use weather_core::{ContentHash, Geoid, KeeperEvent, Snapshot};

/// Frame pushed to WebSocket clients, already encoded as JSON text.
pub type Frame = Arc<str>;

#[derive(Serialize)]
struct UpdateFrame<'a> {
    event: &'static str,
    geoid: Geoid,
    hash: ContentHash,
    observed_at: DateTime<Utc>,
    data: &'a Snapshot,
}

pub fn encode(event: &KeeperEvent) -> Result<Frame, serde_json::Error> {
    let KeeperEvent::New {
        geoid,
        hash,
        snapshot,
        observed_at,
    } = event;
    let frame = UpdateFrame {
        event: "new",
        geoid: *geoid,
        hash: *hash,
        observed_at: *observed_at,
        data: snapshot,
    };
    Ok(serde_json::to_string(&frame)?.into())
}

/// Fans keeper events out to every connected client and remembers the last
/// frame per location for clients that connect later.
#[derive(Clone)]
pub struct Hub {
    latest: Arc<RwLock<BTreeMap<Geoid, Frame>>>,
    tx: broadcast::Sender<Frame>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            latest: Arc::new(RwLock::new(BTreeMap::new())),
            tx,
        }
    }

    pub async fn publish(&self, event: &KeeperEvent) -> Result<(), serde_json::Error> {
        let frame = encode(event)?;
        let mut latest = self.latest.write().await;
        latest.insert(event.geoid(), frame.clone());
        // Sent under the lock so connect() never misses or repeats a frame.
        if self.tx.send(frame).is_err() {
            debug!(geoid = event.geoid(), "no clients connected");
        }
        Ok(())
    }

    /// Returns the latest frame of every location plus a receiver for
    /// everything published afterwards.
    pub async fn connect(&self) -> (Vec<Frame>, broadcast::Receiver<Frame>) {
        let latest = self.latest.read().await;
        let rx = self.tx.subscribe();
        (latest.values().cloned().collect(), rx)
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Pipes one keeper's events into the hub until the keeper goes away.
pub fn forward(hub: Hub, mut events: broadcast::Receiver<KeeperEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(err) = hub.publish(&event).await {
                        warn!(geoid = event.geoid(), error = %err, "failed to encode update");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "hub fell behind keeper");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
