//! Process-wide cache of roots keyed by backend configuration.
//!
//! Every filesystem handle opened with the same [`Options`] gets the same
//! [`RootState`], so they share one lock domain and one persistence loop.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::RootState;
use crate::api::DagClient;
use crate::error::Result;
use crate::options::Options;

pub struct RootRegistry<C: DagClient> {
    roots: Mutex<HashMap<Options, Arc<RootState<C>>>>,
}

impl<C: DagClient> RootRegistry<C> {
    pub fn new() -> Self {
        Self {
            roots: Mutex::new(HashMap::new()),
        }
    }

    /// Shared root for `options`, created on first use with `client`.
    ///
    /// Creation happens under the registry lock, so concurrent first calls
    /// never build two roots for one configuration. A failed creation is
    /// not cached.
    pub async fn root(&self, options: &Options, client: Arc<C>) -> Result<Arc<RootState<C>>> {
        let mut roots = self.roots.lock().await;
        if let Some(root) = roots.get(options) {
            return Ok(Arc::clone(root));
        }
        let root = RootState::new(client, options.clone()).await?;
        roots.insert(options.clone(), Arc::clone(&root));
        Ok(root)
    }

    pub async fn len(&self) -> usize {
        self.roots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.roots.lock().await.is_empty()
    }

    /// Remove every root and run its shutdown (final persist).
    pub async fn shutdown(&self) {
        let roots: Vec<Arc<RootState<C>>> = {
            let mut roots = self.roots.lock().await;
            roots.drain().map(|(_, root)| root).collect()
        };
        for root in roots {
            root.shutdown().await;
        }
    }
}

impl<C: DagClient> Default for RootRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
