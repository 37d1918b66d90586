//! Health probe aggregation (§4.14): each subsystem reports a status, and the
//! overall node status is the worst of its parts.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Status {
    fn severity(self) -> u8 {
        match self {
            Status::Healthy => 0,
            Status::Degraded => 1,
            Status::Unhealthy => 2,
        }
    }

    fn worst(self, other: Status) -> Status {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Checks {
    pub chain: Status,
    pub block_freshness: Status,
    pub peers: Status,
    pub mempool: Status,
    pub memory: Status,
    pub websocket: Status,
    pub storage: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: Status,
    pub checks: Checks,
}

/// Inputs gathered by the caller from each subsystem; kept free of any
/// subsystem type so this crate has no dependency on the rest of the
/// workspace.
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs {
    pub chain_applying_blocks: bool,
    pub ms_since_last_block: u64,
    pub expected_block_time_ms: u64,
    pub connected_peers: usize,
    pub min_peers_for_healthy: usize,
    pub mempool_len: usize,
    pub mempool_capacity: usize,
    pub rss_bytes: u64,
    pub rss_soft_limit_bytes: u64,
    pub websocket_connections: usize,
    pub websocket_max_connections: usize,
    pub storage_writable: bool,
}

/// Blocks older than `3x` the expected interval are stale; a node missing
/// more than half its minimum peer count is degraded, and with zero peers
/// it's unhealthy.
pub fn evaluate(inputs: HealthInputs) -> HealthReport {
    let chain = if inputs.chain_applying_blocks {
        Status::Healthy
    } else {
        Status::Degraded
    };

    let freshness_ratio = if inputs.expected_block_time_ms == 0 {
        0
    } else {
        inputs.ms_since_last_block / inputs.expected_block_time_ms
    };
    let block_freshness = if freshness_ratio <= 2 {
        Status::Healthy
    } else if freshness_ratio <= 5 {
        Status::Degraded
    } else {
        Status::Unhealthy
    };

    let peers = if inputs.connected_peers == 0 {
        Status::Unhealthy
    } else if inputs.connected_peers < inputs.min_peers_for_healthy / 2 {
        Status::Degraded
    } else {
        Status::Healthy
    };

    let mempool = if inputs.mempool_capacity == 0 || inputs.mempool_len < inputs.mempool_capacity {
        Status::Healthy
    } else {
        Status::Degraded
    };

    let memory = if inputs.rss_soft_limit_bytes == 0 || inputs.rss_bytes < inputs.rss_soft_limit_bytes {
        Status::Healthy
    } else {
        Status::Degraded
    };

    let websocket = if inputs.websocket_connections < inputs.websocket_max_connections {
        Status::Healthy
    } else {
        Status::Degraded
    };

    let storage = if inputs.storage_writable {
        Status::Healthy
    } else {
        Status::Unhealthy
    };

    let checks = Checks {
        chain,
        block_freshness,
        peers,
        mempool,
        memory,
        websocket,
        storage,
    };

    let overall = [chain, block_freshness, peers, mempool, memory, websocket, storage]
        .into_iter()
        .fold(Status::Healthy, Status::worst);

    HealthReport { status: overall, checks }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> HealthInputs {
        HealthInputs {
            chain_applying_blocks: true,
            ms_since_last_block: 1_000,
            expected_block_time_ms: 2_000,
            connected_peers: 20,
            min_peers_for_healthy: 10,
            mempool_len: 10,
            mempool_capacity: 1_000,
            rss_bytes: 100,
            rss_soft_limit_bytes: 1_000,
            websocket_connections: 1,
            websocket_max_connections: 100,
            storage_writable: true,
        }
    }

    #[test]
    fn all_healthy_yields_healthy_overall() {
        let report = evaluate(baseline());
        assert_eq!(report.status, Status::Healthy);
    }

    #[test]
    fn stale_chain_degrades_block_freshness() {
        let mut inputs = baseline();
        inputs.ms_since_last_block = 20_000;
        let report = evaluate(inputs);
        assert_eq!(report.checks.block_freshness, Status::Unhealthy);
        assert_eq!(report.status, Status::Unhealthy);
    }

    #[test]
    fn zero_peers_is_unhealthy() {
        let mut inputs = baseline();
        inputs.connected_peers = 0;
        let report = evaluate(inputs);
        assert_eq!(report.checks.peers, Status::Unhealthy);
    }

    #[test]
    fn unwritable_storage_is_unhealthy_overall() {
        let mut inputs = baseline();
        inputs.storage_writable = false;
        let report = evaluate(inputs);
        assert_eq!(report.status, Status::Unhealthy);
    }
}
