//! Remote fingerprint transports.
//!
//! The comparator needs the peer's fingerprints; how they travel is a
//! seam. The daemon's peer RPC implements this trait on its client; the
//! fallback used by the CLI connects to the peer's engine directly.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{Result, fingerprint};

/// Source of a peer's table fingerprints, keyed by `schema.table`.
#[async_trait]
pub trait FingerprintTransport: Send + Sync {
    /// Fetches the peer's current fingerprints.
    async fn fetch_fingerprints(&self) -> Result<BTreeMap<String, String>>;
}

/// Computes fingerprints over a direct connection to the peer's engine.
pub struct DirectTransport {
    pool: PgPool,
}

impl DirectTransport {
    /// Wraps an existing pool to the peer.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FingerprintTransport for DirectTransport {
    async fn fetch_fingerprints(&self) -> Result<BTreeMap<String, String>> {
        fingerprint::capture_live(&self.pool).await
    }
}
