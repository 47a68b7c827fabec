//! Readiness rendezvous: a one-shot signal per in-flight provision, keyed by
//! the instance's assigned IP.
//!
//! The provisioner registers a receiver before starting the sandbox and
//! blocks on it; the `/ready` handler looks the sender up by the poster's
//! source IP, removes it, and signals it. `DashMap::remove` gives an
//! atomic "take it out and signal at most once": two concurrent `/ready`
//! posts for the same IP can't both find an entry.

use std::net::Ipv4Addr;

use dashmap::DashMap;
use tokio::sync::oneshot;

pub struct ReadinessMap {
    inner: DashMap<Ipv4Addr, oneshot::Sender<()>>,
}

impl Default for ReadinessMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessMap {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Register a waiter for `ip`, returning the receiver half to block on.
    /// Must be called before the backend is asked to boot the sandbox at
    /// that IP, so the poster can never arrive before it's registered.
    pub fn register(&self, ip: Ipv4Addr) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.insert(ip, tx);
        rx
    }

    /// Signal the waiter for `ip`, if one is still registered. Returns
    /// `true` if a waiter was found and signalled, `false` for an unknown
    /// or already-signalled IP (a no-op, per the at-most-once invariant).
    pub fn signal(&self, ip: Ipv4Addr) -> bool {
        match self.inner.remove(&ip) {
            Some((_, tx)) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Drop a pending registration without signalling it, e.g. when the
    /// provisioning task that registered it fails before the sandbox ever
    /// boots.
    pub fn cancel(&self, ip: Ipv4Addr) {
        self.inner.remove(&ip);
    }
}
