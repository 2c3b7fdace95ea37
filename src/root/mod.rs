//! Shared root hash state machine.
//!
//! A [`RootState`] owns the single logical root hash of one backend
//! configuration. Filesystem operations read it under the shared lock and
//! rewrite it under the exclusive lock; a background task periodically
//! persists it to MFS or IPNS and swaps the pin from the previously
//! persisted hash to the new one.

pub mod persist;
pub mod registry;

pub use persist::PersistOutcome;
pub use registry::RootRegistry;

use std::sync::{Arc, Weak};

use tokio::sync::{watch, Mutex, RwLock, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::DagClient;
use crate::error::{Error, Result};
use crate::options::Options;

/// Parsed form of the configured root path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootPath {
    /// Empty root: mirror the tree into the endpoint's MFS.
    Mfs,
    /// `/ipfs/<hash>`: immutable snapshot.
    Ipfs(String),
    /// `/ipns/<name>`: mutable name record.
    Ipns { path: String, name: String },
}

impl RootPath {
    pub fn parse(root: &str) -> Result<Self> {
        if root.is_empty() {
            return Ok(RootPath::Mfs);
        }
        let (base, last) = match root.rfind('/') {
            Some(i) => root.split_at(i + 1),
            None => return Err(Error::InvalidRoot(root.to_string())),
        };
        match base {
            "/ipfs/" if !last.is_empty() => Ok(RootPath::Ipfs(last.to_string())),
            "/ipns/" if !last.is_empty() => Ok(RootPath::Ipns {
                path: root.to_string(),
                name: last.to_string(),
            }),
            _ => Err(Error::InvalidRoot(root.to_string())),
        }
    }
}

/// How the root hash is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootMode {
    ReadOnlyIpfsPath,
    /// `key` is the name of the owned key able to publish the record, if any.
    Ipns { path: String, key: Option<String> },
    Mfs,
}

/// Hashes guarded by the root lock.
#[derive(Debug)]
struct RootHashes {
    /// Current in-memory DAG root.
    current: String,
    /// Last hash successfully written to MFS/IPNS; diff baseline.
    last_persisted: String,
    /// Hashes pinned on behalf of this root and not yet released, oldest
    /// first. Holds more than one entry only while an unpin is pending.
    pinned: Vec<String>,
}

/// Exclusive access to the root hash for a read-modify-write patch sequence.
///
/// Operations thread intermediate hashes through local variables and call
/// [`RootGuard::set_hash`] once, after the last patch succeeded.
pub struct RootGuard<'a> {
    hashes: RwLockWriteGuard<'a, RootHashes>,
}

impl RootGuard<'_> {
    pub fn hash(&self) -> &str {
        &self.hashes.current
    }

    pub fn set_hash(&mut self, hash: String) {
        self.hashes.current = hash;
    }
}

pub struct RootState<C: DagClient> {
    client: Arc<C>,
    options: Options,
    mode: RootMode,
    read_only: bool,
    hashes: RwLock<RootHashes>,
    /// Single slot: at most one persist runs at a time.
    persisting: Mutex<()>,
    shutdown_tx: watch::Sender<bool>,
    persist_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<C: DagClient> RootState<C> {
    /// Build the root for `options`, resolving its initial hash and mode.
    ///
    /// Writable roots start the periodic persistence task; call
    /// [`RootState::shutdown`] to stop it and flush pending changes.
    pub async fn new(client: Arc<C>, options: Options) -> Result<Arc<Self>> {
        let endpoint_read_only = client.is_read_only().await?;

        let (mode, hash) = match RootPath::parse(&options.root)? {
            RootPath::Ipfs(hash) => {
                log::info!("IPFS path '{}' is read only", options.root);
                (RootMode::ReadOnlyIpfsPath, hash)
            }
            RootPath::Ipns { path, name } => {
                let resolved = client
                    .name_resolve(&path)
                    .await
                    .map_err(|e| Error::resolve(&path, e))?;
                let hash = last_segment(&resolved).to_string();
                let key = if endpoint_read_only {
                    log::warn!(
                        "IPNS path '{}' is read only since the endpoint is a read only gateway",
                        path
                    );
                    None
                } else {
                    let key = client
                        .key_list()
                        .await?
                        .into_iter()
                        .find(|k| k.id == name)
                        .map(|k| k.name);
                    if key.is_none() {
                        log::warn!(
                            "IPNS path '{}' is read only since the endpoint does not have the private key to modify it",
                            path
                        );
                    }
                    key
                };
                (RootMode::Ipns { path, key }, hash)
            }
            RootPath::Mfs => {
                if endpoint_read_only {
                    return Err(Error::MfsUnavailable);
                }
                let hash = client.files_stat("/").await?;
                (RootMode::Mfs, hash)
            }
        };

        let read_only = endpoint_read_only
            || match &mode {
                RootMode::ReadOnlyIpfsPath => true,
                RootMode::Ipns { key, .. } => key.is_none(),
                RootMode::Mfs => false,
            };

        log::info!(
            "Opened IPFS root '{}' at {} ({:?}, read only: {})",
            options.root,
            hash,
            mode,
            read_only
        );

        let (shutdown_tx, _) = watch::channel(false);
        let state = Arc::new(Self {
            client,
            options,
            mode,
            read_only,
            hashes: RwLock::new(RootHashes {
                current: hash.clone(),
                last_persisted: hash.clone(),
                pinned: vec![hash],
            }),
            persisting: Mutex::new(()),
            shutdown_tx,
            persist_task: std::sync::Mutex::new(None),
        });

        if !state.read_only {
            state.spawn_periodic_persist();
        }
        Ok(state)
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn mode(&self) -> &RootMode {
        &self.mode
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// IPNS path backing this root, if any.
    pub fn ipns_path(&self) -> Option<&str> {
        match &self.mode {
            RootMode::Ipns { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Fail fast before any network call when the root cannot be modified.
    pub fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly(self.options.root.clone()));
        }
        Ok(())
    }

    /// Current root hash (shared lock).
    pub async fn hash(&self) -> String {
        self.hashes.read().await.current.clone()
    }

    pub async fn last_persisted_hash(&self) -> String {
        self.hashes.read().await.last_persisted.clone()
    }

    /// Take the exclusive lock for a patch sequence.
    ///
    /// Fails with `ReadOnly` before locking when the root cannot be modified.
    pub async fn lock(&self) -> Result<RootGuard<'_>> {
        self.check_writable()?;
        Ok(RootGuard {
            hashes: self.hashes.write().await,
        })
    }

    /// Reconcile the in-memory hash with MFS or IPNS and move the pin.
    ///
    /// Concurrent callers queue behind the in-flight persist and then skip if
    /// it already covered their changes.
    pub async fn persist(&self) -> Result<PersistOutcome> {
        let _slot = self.persisting.lock().await;

        let (previous, target, pinned) = {
            let hashes = self.hashes.read().await;
            (
                hashes.last_persisted.clone(),
                hashes.current.clone(),
                hashes.pinned.clone(),
            )
        };
        let pins_settled = pinned.iter().all(|hash| *hash == target);
        if self.read_only || (previous == target && pins_settled) {
            return Ok(PersistOutcome::Unchanged);
        }

        // Pin the target before releasing anything.
        if !pinned.contains(&target) {
            persist::pin(self.client.as_ref(), &target).await?;
            self.hashes.write().await.pinned.push(target.clone());
        }
        for stale in pinned.iter().filter(|hash| **hash != target) {
            persist::unpin(self.client.as_ref(), stale).await?;
            self.hashes.write().await.pinned.retain(|hash| hash != stale);
        }
        log::debug!(
            "Pinned '{}', released {} older hash(es)",
            target,
            pinned.iter().filter(|hash| **hash != target).count()
        );

        if previous == target {
            return Ok(PersistOutcome::Unchanged);
        }

        match &self.mode {
            RootMode::Mfs => {
                persist::persist_to_mfs(self.client.as_ref(), &previous, &target).await?
            }
            RootMode::Ipns {
                path,
                key: Some(key),
            } => {
                persist::persist_to_ipns(self.client.as_ref(), &previous, &target, path, key)
                    .await?
            }
            _ => {}
        }

        self.hashes.write().await.last_persisted = target.clone();
        Ok(PersistOutcome::Persisted {
            from: previous,
            to: target,
        })
    }

    /// Stop the periodic task (letting an in-flight persist finish) and run a
    /// final best-effort persist.
    pub async fn shutdown(&self) {
        if self.read_only {
            return;
        }
        self.shutdown_tx.send_replace(true);

        let task = self
            .persist_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::error!("Persist task for '{}' ended abnormally: {}", self.options.root, e);
            }
        }

        match self.persist().await {
            Ok(outcome) => log::debug!("Final persist of '{}': {:?}", self.options.root, outcome),
            Err(e) => log::error!("Final persist of '{}' failed: {}", self.options.root, e),
        }
    }

    fn spawn_periodic_persist(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.options.update_period;
        let shutdown_rx = self.shutdown_tx.subscribe();
        let task = tokio::spawn(run_periodic_persist(weak, period, shutdown_rx));
        *self
            .persist_task
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(task);
    }
}

/// Background loop: persist every `period` until shutdown is signalled or
/// the root is dropped. A persist that has started always runs to completion.
async fn run_periodic_persist<C: DagClient>(
    root: Weak<RootState<C>>,
    period: std::time::Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; nothing can have changed yet.
    ticker.tick().await;

    log::debug!("Persist task started (interval: {:?})", period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        let Some(state) = root.upgrade() else { break };
        match state.persist().await {
            Ok(PersistOutcome::Unchanged) => {}
            Ok(PersistOutcome::Persisted { from, to }) => {
                log::info!("Persisted IPFS root '{}': {} -> {}", state.options.root, from, to)
            }
            Err(e) if e.is_conflict() => {
                log::warn!("Persist of '{}' skipped: {}", state.options.root, e)
            }
            Err(e) => log::error!("Persist of '{}' failed: {}", state.options.root, e),
        }
    }

    log::debug!("Persist task stopped");
}

fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}
