//! Component B: the cluster-config manager. Holds the latest topology
//! snapshot, gates updates by revision, and coordinates waiters that need to
//! know when the topology changes or goes stale.

use crate::error::{Error, Result};
use crate::types::ClusterConfig;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(15);
const MAX_AGE_ENV: &str = "CB_REST_CC_MAX_AGE";

struct State {
    current: Option<Arc<ClusterConfig>>,
    last_installed_at: Instant,
}

/// Shared owner of the live `ClusterConfig`. Every read goes through
/// `get_cluster_config`; every write goes through `update`, which enforces
/// the monotonic-revision invariant and wakes anyone parked in
/// `wait_until_updated`.
pub struct ClusterConfigManager {
    state: RwLock<State>,
    max_age: Duration,
    updated: Notify,
}

impl ClusterConfigManager {
    pub fn new() -> Result<Self> {
        Self::with_max_age(resolve_max_age()?)
    }

    pub fn with_max_age(max_age: Duration) -> Result<Self> {
        if max_age.is_zero() {
            return Err(Error::Configuration(
                "cluster config max age must be positive".to_string(),
            ));
        }
        Ok(Self {
            state: RwLock::new(State { current: None, last_installed_at: Instant::now() }),
            max_age,
            updated: Notify::new(),
        })
    }

    /// Install `new` if its revision is not older than the current one.
    /// Equal revisions are accepted (and waiters woken): a same-revision
    /// refresh still means the node list was just reconfirmed live.
    pub fn update(&self, new: ClusterConfig) -> Result<()> {
        {
            let mut state = self.state.write().expect("cluster config lock poisoned");
            if let Some(current) = &state.current {
                if new.revision < current.revision {
                    return Err(Error::OldClusterConfig);
                }
            }
            state.current = Some(Arc::new(new));
            state.last_installed_at = Instant::now();
        }
        // Notified outside the lock: no waiter can observe a torn update, and
        // we avoid waking tasks while holding the write lock.
        self.updated.notify_waiters();
        Ok(())
    }

    pub fn get_cluster_config(&self) -> Option<Arc<ClusterConfig>> {
        self.state.read().expect("cluster config lock poisoned").current.clone()
    }

    /// Blocks until the next accepted `update`, or until `cancel` fires.
    /// Edge-triggered: a caller that starts waiting after an `update` has
    /// already completed waits for the *next* one.
    pub async fn wait_until_updated(&self, cancel: &CancellationToken) {
        tokio::select! {
            _ = self.updated.notified() => {}
            _ = cancel.cancelled() => {}
        }
    }

    /// Blocks until the config is at least `max_age` old, or until `cancel`
    /// fires.
    pub async fn wait_until_expired(&self, cancel: &CancellationToken) {
        loop {
            let age = self.state.read().expect("cluster config lock poisoned").last_installed_at.elapsed();
            if age >= self.max_age {
                return;
            }
            let remaining = self.max_age - age;
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }
}

fn resolve_max_age() -> Result<Duration> {
    match std::env::var(MAX_AGE_ENV) {
        Ok(value) => humantime::parse_duration(&value)
            .map_err(|e| Error::Configuration(format!("invalid {MAX_AGE_ENV}: {e}"))),
        Err(_) => Ok(DEFAULT_MAX_AGE),
    }
}
