//! Backend configuration.
//!
//! `Options` doubles as the identity key of a shared root: two filesystem
//! handles opened with equal options share one hash and one persistence loop.

use std::time::Duration;

/// Local Kubo RPC endpoint.
pub const LOCAL_GATEWAY: &str = "http://localhost:5001";

/// Public gateway (read only) used for public links.
pub const PUBLIC_GATEWAY: &str = "https://ipfs.io";

/// Time between two periodic persists of the in-memory root.
pub const DEFAULT_UPDATE_PERIOD: Duration = Duration::from_secs(15);

/// Environment variable names read by [`Options::from_env`].
pub const ENV_URL: &str = "IPFS_API_URL";
pub const ENV_ROOT: &str = "IPFS_ROOT";
pub const ENV_UPDATE_PERIOD: &str = "IPFS_UPDATE_PERIOD";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Options {
    /// IPFS RPC API server URL, without trailing slash.
    pub endpoint: String,
    /// Empty for MFS, otherwise `/ipfs/<hash>` or `/ipns/<name>`.
    pub root: String,
    /// Period of the background persistence loop.
    pub update_period: Duration,
}

impl Options {
    pub fn new(endpoint: &str, root: &str, update_period: Duration) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            root: root.to_string(),
            update_period,
        }
    }

    /// Build options from `IPFS_API_URL`, `IPFS_ROOT` and `IPFS_UPDATE_PERIOD`
    /// (seconds), falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let endpoint = std::env::var(ENV_URL).unwrap_or_else(|_| LOCAL_GATEWAY.to_string());
        let root = std::env::var(ENV_ROOT).unwrap_or_default();
        let update_period = match std::env::var(ENV_UPDATE_PERIOD) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(e) => {
                    log::warn!(
                        "Ignoring {}='{}': {} (using {}s)",
                        ENV_UPDATE_PERIOD,
                        raw,
                        e,
                        DEFAULT_UPDATE_PERIOD.as_secs()
                    );
                    DEFAULT_UPDATE_PERIOD
                }
            },
            Err(_) => DEFAULT_UPDATE_PERIOD,
        };
        Self::new(&endpoint, &root, update_period)
    }

    pub fn with_endpoint(self, endpoint: &str) -> Self {
        Self::new(endpoint, &self.root, self.update_period)
    }

    pub fn with_root(mut self, root: &str) -> Self {
        self.root = root.to_string();
        self
    }

    pub fn with_update_period(mut self, update_period: Duration) -> Self {
        self.update_period = update_period;
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new(LOCAL_GATEWAY, "", DEFAULT_UPDATE_PERIOD)
    }
}
