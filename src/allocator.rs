//! Atomic IP and TAP-index allocators.
//!
//! Both allocators are lock-free counters shared across every concurrent
//! provisioning task. `IpAllocator::next` advances the address *before*
//! returning it, so the first call after parsing a base address returns
//! the address immediately following it.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("invalid base IPv4 address: {0}")]
    InvalidAddress(String),

    /// Fails closed on exhaustion instead of silently wrapping into the
    /// bridge's own address range.
    #[error("IPv4 address space exhausted")]
    AddressSpaceExhausted,
}

/// Hands out fresh IPv4 addresses under concurrent provisioning.
///
/// Increment semantics: add 1 to the low byte; carry 255→0 into the next
/// byte up; fail closed if the whole address would wrap past
/// 255.255.255.255.
pub struct IpAllocator {
    // Packed as u32 so the whole 4-byte address advances under a single CAS.
    current: AtomicU32,
}

impl IpAllocator {
    /// Parse a base address; the allocator starts just before it, so the
    /// first `next()` call returns the address immediately after `base`.
    pub fn new(base: &str) -> Result<Self, AllocatorError> {
        let addr: Ipv4Addr = base
            .parse()
            .map_err(|_| AllocatorError::InvalidAddress(base.to_string()))?;
        Ok(Self {
            current: AtomicU32::new(u32::from(addr)),
        })
    }

    /// Atomically advance and return the next address in the sequence.
    pub fn next(&self) -> Result<Ipv4Addr, AllocatorError> {
        let mut result = Err(AllocatorError::AddressSpaceExhausted);
        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current.checked_add(1)?;
                result = Ok(Ipv4Addr::from(next));
                Some(next)
            });
        result
    }
}

/// Hands out a monotonically increasing TAP device index.
///
/// Starts at -1 so the first call returns 0. The allocator's current value
/// doubles as the count of TAP devices ever created, used by shutdown to
/// know which `<prefix>0..<prefix>N-1` devices to remove.
pub struct TapAllocator {
    current: AtomicI64,
    // Tracks indices that were successfully created, so shutdown cleanup
    // never tries to delete a TAP that never came into existence.
    live: Mutex<Vec<i64>>,
}

impl Default for TapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl TapAllocator {
    pub fn new() -> Self {
        Self {
            current: AtomicI64::new(-1),
            live: Mutex::new(Vec::new()),
        }
    }

    /// Atomically advance and return the next TAP index.
    pub fn next(&self) -> i64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record that the TAP device for `index` was successfully created.
    pub fn mark_live(&self, index: i64) {
        self.live.lock().expect("tap allocator lock poisoned").push(index);
    }

    /// Record that the TAP device for `index` has already been torn down.
    pub fn mark_released(&self, index: i64) {
        self.live.lock().expect("tap allocator lock poisoned").retain(|i| *i != index);
    }

    /// Indices of TAP devices still believed to exist on the host.
    pub fn live_indices(&self) -> Vec<i64> {
        self.live.lock().expect("tap allocator lock poisoned").clone()
    }

    /// The count of TAP devices ever created (current allocator value + 1).
    pub fn total_allocated(&self) -> i64 {
        self.current.load(Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use rstest::rstest;

    #[test]
    fn ip_allocator_advances_before_use() {
        let alloc = IpAllocator::new("172.44.0.1").unwrap();
        assert_eq!(alloc.next().unwrap(), "172.44.0.2".parse().unwrap());
        assert_eq!(alloc.next().unwrap(), "172.44.0.3".parse().unwrap());
    }

    #[rstest]
    #[case("10.0.0.254", "10.0.0.255")]
    #[case("10.0.0.255", "10.0.1.0")]
    #[case("10.0.255.255", "10.1.0.0")]
    #[case("10.255.255.255", "11.0.0.0")]
    fn ip_allocator_carries_across_byte_boundaries(#[case] base: &str, #[case] expected: &str) {
        let alloc = IpAllocator::new(base).unwrap();
        assert_eq!(alloc.next().unwrap(), expected.parse().unwrap());
    }

    #[test]
    fn ip_allocator_fails_closed_on_exhaustion() {
        let alloc = IpAllocator::new("255.255.255.254").unwrap();
        assert_eq!(alloc.next().unwrap(), "255.255.255.255".parse().unwrap());
        assert!(matches!(
            alloc.next(),
            Err(AllocatorError::AddressSpaceExhausted)
        ));
    }

    #[test]
    fn ip_allocator_is_unique_under_contention() {
        let alloc = Arc::new(IpAllocator::new("10.0.0.0").unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let alloc = Arc::clone(&alloc);
            handles.push(thread::spawn(move || {
                (0..50)
                    .map(|_| alloc.next().unwrap())
                    .collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<Ipv4Addr> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort();
        let before = all.len();
        all.dedup();
        assert_eq!(all.len(), before, "allocator handed out a duplicate address");
        assert_eq!(all.len(), 400);
    }

    #[test]
    fn tap_allocator_starts_at_zero() {
        let alloc = TapAllocator::new();
        assert_eq!(alloc.next(), 0);
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.total_allocated(), 2);
    }

    #[test]
    fn tap_allocator_is_unique_under_contention() {
        let alloc = Arc::new(TapAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let alloc = Arc::clone(&alloc);
            handles.push(thread::spawn(move || {
                (0..50).map(|_| alloc.next()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort();
        let before = all.len();
        all.dedup();
        assert_eq!(all.len(), before);
        assert_eq!(all, (0..400).collect::<Vec<_>>());
    }

    #[test]
    fn tap_allocator_tracks_live_indices() {
        let alloc = TapAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        alloc.mark_live(a);
        alloc.mark_live(b);
        alloc.mark_released(a);
        assert_eq!(alloc.live_indices(), vec![b]);
    }
}
