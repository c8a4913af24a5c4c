//! Mock ICE provider.

use async_trait::async_trait;
use call_controller::errors::IceError;
use call_controller::transport::{IceProvider, IceServer};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// ICE provider returning a fixed list, or failing on demand.
#[derive(Debug, Clone, Default)]
pub struct MockIceProvider {
    servers: Vec<IceServer>,
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockIceProvider {
    #[must_use]
    pub fn new(servers: Vec<IceServer>) -> Self {
        Self {
            servers,
            ..Self::default()
        }
    }

    /// Provider whose every fetch fails with a 503.
    #[must_use]
    pub fn failing() -> Self {
        let provider = Self::default();
        provider.set_failure(true);
        provider
    }

    pub fn set_failure(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of fetches so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IceProvider for MockIceProvider {
    async fn ice_servers(&self) -> Result<Vec<IceServer>, IceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(IceError::Status(503));
        }
        Ok(self.servers.clone())
    }
}
