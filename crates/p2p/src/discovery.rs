//! Discovery request bookkeeping (§4.9 `FindNode`/`FindNodeResponse`, §5
//! cancellation/timeouts): a pending-request map keyed by `requestId`, each
//! entry cleared on response or after a 10s client-side timeout.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::P2PError;
use crate::message::FindNodeResp;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PendingDiscovery {
    timeout: Duration,
    inner: Mutex<HashMap<u64, oneshot::Sender<FindNodeResp>>>,
}

impl Default for PendingDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingDiscovery {
    pub fn new() -> Self {
        Self::with_timeout(DISCOVERY_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `request_id` as pending and waits up to the configured
    /// timeout (10s in production) for a matching `resolve` call. The
    /// pending entry is cleared either way.
    pub async fn wait_for(&self, request_id: u64) -> Result<FindNodeResp, P2PError> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(request_id, tx);
        let outcome = tokio::time::timeout(self.timeout, rx).await;
        self.inner.lock().remove(&request_id);
        match outcome {
            Ok(Ok(resp)) => Ok(resp),
            _ => Err(P2PError::DiscoveryTimeout),
        }
    }

    /// Delivers a response to whoever is waiting on `request_id`, if anyone.
    /// A response for an unknown or already-timed-out request is dropped.
    pub fn resolve(&self, request_id: u64, resp: FindNodeResp) {
        if let Some(tx) = self.inner.lock().remove(&request_id) {
            let _ = tx.send(resp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PeerInfo;
    use std::sync::Arc;

    #[tokio::test]
    async fn resolves_a_pending_request() {
        let pending = Arc::new(PendingDiscovery::new());
        let waiter = pending.clone();
        let handle = tokio::spawn(async move { waiter.wait_for(1).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        pending.resolve(
            1,
            FindNodeResp {
                request_id: 1,
                peers: vec![PeerInfo {
                    node_id: coc_common::NodeId::zero(),
                    addr: "127.0.0.1:30303".into(),
                }],
            },
        );
        let resp = handle.await.unwrap().unwrap();
        assert_eq!(resp.peers.len(), 1);
    }

    #[tokio::test]
    async fn unresolved_request_times_out() {
        let pending = PendingDiscovery::with_timeout(Duration::from_millis(20));
        let err = pending.wait_for(2).await.unwrap_err();
        assert!(matches!(err, P2PError::DiscoveryTimeout));
    }
}
