//! Admission control (§4.9): global connection cap plus a per-IP cap.
//! Exceeding either closes the connection with a log line.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::P2PError;

struct Inner {
    total: usize,
    per_ip: HashMap<IpAddr, usize>,
}

pub struct PeerTable {
    max_connections: usize,
    max_per_ip: usize,
    inner: Mutex<Inner>,
}

/// RAII admission ticket: releases its slot on drop, however the
/// connection task exits (normal close, error, panic unwind).
pub struct ConnectionSlot {
    table: Arc<PeerTable>,
    ip: IpAddr,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let mut inner = self.table.inner.lock();
        inner.total = inner.total.saturating_sub(1);
        if let Some(count) = inner.per_ip.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.per_ip.remove(&self.ip);
            }
        }
    }
}

impl PeerTable {
    pub fn new(max_connections: usize, max_per_ip: usize) -> Arc<Self> {
        Arc::new(Self {
            max_connections,
            max_per_ip,
            inner: Mutex::new(Inner {
                total: 0,
                per_ip: HashMap::new(),
            }),
        })
    }

    pub fn try_admit(self: &Arc<Self>, ip: IpAddr) -> Result<ConnectionSlot, P2PError> {
        let mut inner = self.inner.lock();
        if inner.total >= self.max_connections {
            return Err(P2PError::AdmissionRejected("global connection cap reached"));
        }
        let per_ip_count = inner.per_ip.get(&ip).copied().unwrap_or(0);
        if per_ip_count >= self.max_per_ip {
            return Err(P2PError::AdmissionRejected("per-IP connection cap reached"));
        }
        inner.total += 1;
        *inner.per_ip.entry(ip).or_insert(0) += 1;
        Ok(ConnectionSlot {
            table: self.clone(),
            ip,
        })
    }

    pub fn connected_count(&self) -> usize {
        self.inner.lock().total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_beyond_global_cap() {
        let table = PeerTable::new(1, 5);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let _slot = table.try_admit(ip).unwrap();
        assert!(table.try_admit("10.0.0.2".parse().unwrap()).is_err());
    }

    #[test]
    fn rejects_beyond_per_ip_cap() {
        let table = PeerTable::new(10, 1);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let _slot = table.try_admit(ip).unwrap();
        assert!(table.try_admit(ip).is_err());
    }

    #[test]
    fn releases_slot_on_drop() {
        let table = PeerTable::new(1, 5);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        {
            let _slot = table.try_admit(ip).unwrap();
            assert_eq!(table.connected_count(), 1);
        }
        assert_eq!(table.connected_count(), 0);
        assert!(table.try_admit(ip).is_ok());
    }
}
