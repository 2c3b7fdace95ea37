//! Write-back of the in-memory root to the external store.
//!
//! MFS write-back replays the local diff (last persisted hash -> current
//! hash) path by path. Before doing so it checks whether MFS moved away from
//! the last persisted hash; if it did, any overlap between locally and
//! externally changed paths aborts the whole persist before the first write.
//! Paths an earlier, interrupted write-back already updated are recognised
//! and not counted as external changes.

use std::collections::HashMap;

use crate::api::types::ObjectChange;
use crate::api::DagClient;
use crate::error::{Error, Result};

/// Result of a persist attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The in-memory hash already matched the last persisted hash.
    Unchanged,
    Persisted { from: String, to: String },
}

/// Pin `hash` recursively.
pub async fn pin<C: DagClient>(client: &C, hash: &str) -> Result<()> {
    client.pin_add(hash, true).await.map_err(|e| {
        Error::pin(
            format!("could not pin hash '{}' on IPFS endpoint, consistency not guaranteed", hash),
            e,
        )
    })
}

/// Release the pin on `hash`.
///
/// Unpinning a hash that is not pinned is not an error.
pub async fn unpin<C: DagClient>(client: &C, hash: &str) -> Result<()> {
    match client.pin_rm(hash).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_pinned() => {
            log::debug!("Hash '{}' was already not pinned", hash);
            Ok(())
        }
        Err(e) => Err(Error::pin(format!("could not un-pin old hash '{}'", hash), e)),
    }
}

/// Either path is a prefix of the other.
///
/// Plain string prefixes are compared, so `a/b` also overlaps `a/bc`.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// First (local, external) pair of overlapping changed paths.
pub fn find_conflict<'a>(
    local: &'a [ObjectChange],
    external: &'a [ObjectChange],
) -> Option<(&'a str, &'a str)> {
    external.iter().find_map(|ext| {
        local
            .iter()
            .find(|loc| paths_overlap(&loc.path, &ext.path))
            .map(|loc| (loc.path.as_str(), ext.path.as_str()))
    })
}

/// How far an earlier, failed write-back got with a local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replayed {
    /// MFS already holds the new value.
    Done,
    /// The old entry was removed but the new one never copied in.
    Removed,
}

/// Local changes that MFS already reflects, fully or in part, keyed by path.
///
/// An external change is our own leftover when MFS holds exactly the value
/// the local change writes, or when the path is gone while the local change
/// replaces it. Such changes are not external edits.
pub fn replayed_changes(
    local: &[ObjectChange],
    external: &[ObjectChange],
) -> HashMap<String, Replayed> {
    let mut replayed = HashMap::new();
    for ext in external {
        let Some(loc) = local.iter().find(|loc| loc.path == ext.path) else {
            continue;
        };
        if ext.before == loc.after {
            replayed.insert(ext.path.clone(), Replayed::Done);
        } else if ext.before.is_none() && loc.before.is_some() {
            replayed.insert(ext.path.clone(), Replayed::Removed);
        }
    }
    replayed
}

/// Apply the changes between `last_persisted` and `new_hash` to MFS.
pub async fn persist_to_mfs<C: DagClient>(
    client: &C,
    last_persisted: &str,
    new_hash: &str,
) -> Result<()> {
    let external_hash = client
        .files_stat("/")
        .await
        .map_err(|e| Error::persist("could not obtain stats for MFS root directory", e))?;

    let diff = client.object_diff(last_persisted, new_hash).await?;

    let mut replayed = HashMap::new();
    if external_hash != last_persisted {
        let external_diff = client.object_diff(&external_hash, last_persisted).await?;
        replayed = replayed_changes(&diff, &external_diff);
        let external_diff: Vec<ObjectChange> = external_diff
            .into_iter()
            .filter(|ext| !replayed.contains_key(&ext.path))
            .collect();

        // MFS was modified outside this process.
        if let Some((local, external)) = find_conflict(&diff, &external_diff) {
            return Err(Error::Conflict {
                store: "MFS",
                detail: format!(
                    "local change at '/{}' overlaps external change at '/{}'",
                    local, external
                ),
            });
        }
        if !replayed.is_empty() {
            log::info!("Resuming MFS write-back, {} path(s) already applied", replayed.len());
        }
        if !external_diff.is_empty() {
            log::info!(
                "MFS root moved to {} outside this process, changes do not overlap",
                external_hash
            );
        }
    }

    for change in &diff {
        let file_path = format!("/{}", change.path);
        let state = replayed.get(&change.path).copied();
        if state == Some(Replayed::Done) {
            continue;
        }
        if change.before.is_some() && state.is_none() {
            client.files_rm(&file_path).await.map_err(|e| {
                Error::persist(format!("could not update MFS at path '{}'", file_path), e)
            })?;
        }
        if let Some(after) = &change.after {
            let absolute_path = format!("/ipfs/{}", after.cid);
            client
                .files_cp(&absolute_path, &file_path)
                .await
                .map_err(|e| {
                    Error::persist(format!("could not update MFS at path '{}'", file_path), e)
                })?;
        }
    }

    log::debug!("Updated IPFS MFS to '/ipfs/{}'", new_hash);
    Ok(())
}

/// Publish `new_hash` under `ipns_key`, unless the record moved since the
/// last persist.
pub async fn persist_to_ipns<C: DagClient>(
    client: &C,
    last_persisted: &str,
    new_hash: &str,
    ipns_path: &str,
    ipns_key: &str,
) -> Result<()> {
    let resolved = client.name_resolve(ipns_path).await.map_err(|e| {
        Error::persist(format!("could not resolve IPNS path '{}'", ipns_path), e)
    })?;
    let ipfs_hash = resolved.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if ipfs_hash != last_persisted {
        return Err(Error::Conflict {
            store: "IPNS",
            detail: format!(
                "'{}' resolves to '{}', expected '{}'",
                ipns_path, ipfs_hash, last_persisted
            ),
        });
    }

    client
        .name_publish(new_hash, ipns_key)
        .await
        .map_err(|e| Error::persist(format!("could not update IPNS path '{}'", ipns_path), e))?;

    log::debug!("Updated IPNS '{}' to path '/ipfs/{}'", ipns_path, new_hash);
    Ok(())
}
