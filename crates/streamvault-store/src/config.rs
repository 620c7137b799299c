//! Store configuration.

use serde::{Deserialize, Serialize};

/// Configuration for [`crate::StreamStore`].
///
/// Resolved once at construction; components never consult ambient config
/// at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Approximate retention bound applied on every append. `None` keeps
    /// streams unbounded.
    #[serde(default = "default_maxlen")]
    pub default_maxlen: Option<u64>,

    /// Namespace prefix for per-stream metadata KV keys.
    #[serde(default = "default_meta_prefix")]
    pub meta_prefix: String,
}

fn default_maxlen() -> Option<u64> {
    Some(10_000)
}

fn default_meta_prefix() -> String {
    "XMETA".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_maxlen: default_maxlen(),
            meta_prefix: default_meta_prefix(),
        }
    }
}

impl StoreConfig {
    /// The KV key holding a stream's metadata blob.
    pub fn meta_key(&self, stream: &str) -> String {
        format!("{}:{}", self.meta_prefix, stream)
    }
}
