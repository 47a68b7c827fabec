//! The `Instance` record and its lifecycle states.
//!
//! An instance is referenced simultaneously by its per-function pool (when
//! idle), the dispatcher (when serving), and the controller's IP→instance
//! index (for the whole boot). Rather than threading multiple owning
//! references to the same value through those three places, each of them
//! holds an `Arc<Instance>` cloned from the one created by the provisioner;
//! the controller's index is the only place that is considered authoritative
//! for "does this instance still exist".

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::process::Child;

use crate::config::BackendKind;

/// The OS-level handle backing an instance: a child process for VM/unikernel
/// sandboxes, or a container id for the container backend.
pub enum InstanceHandle {
    Process(Child),
    Container(String),
}

/// `booting -> ready -> busy <-> ready -> terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Booting = 0,
    Ready = 1,
    Busy = 2,
    Terminated = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Booting,
            1 => Self::Ready,
            2 => Self::Busy,
            _ => Self::Terminated,
        }
    }
}

pub struct Instance {
    /// Stable identifier: the assigned IPv4 for VM/unikernel instances, or
    /// the generated UUID for container instances.
    pub id: String,
    pub function: String,
    pub backend: BackendKind,
    pub ip: Ipv4Addr,
    pub boot_time: DateTime<Utc>,
    /// Monotonic clock counterpart of `boot_time`, used to compute the
    /// VM-init duration handed to the stats collector without being subject
    /// to wall-clock adjustment.
    pub boot_instant: Instant,
    /// TAP index allocated for this instance, if the backend used one
    /// (microVM/unikernel). `None` for containers.
    pub tap_index: Option<i64>,
    state: AtomicU8,
    handle: Mutex<Option<InstanceHandle>>,
}

impl Instance {
    pub fn new(
        id: String,
        function: String,
        backend: BackendKind,
        ip: Ipv4Addr,
        tap_index: Option<i64>,
        handle: InstanceHandle,
    ) -> Self {
        Self {
            id,
            function,
            backend,
            ip,
            boot_time: Utc::now(),
            boot_instant: Instant::now(),
            tap_index,
            state: AtomicU8::new(LifecycleState::Booting as u8),
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Take the OS handle out of the instance for teardown. Leaves `None`
    /// behind so a second teardown attempt is a no-op rather than a double
    /// kill.
    pub fn take_handle(&self) -> Option<InstanceHandle> {
        self.handle.lock().expect("instance handle lock poisoned").take()
    }

    pub fn container_id(&self) -> Option<&str> {
        match self.backend {
            BackendKind::Container => Some(&self.id),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("function", &self.function)
            .field("backend", &self.backend)
            .field("ip", &self.ip)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Instance {
        Instance::new(
            "172.44.0.2".to_string(),
            "pi".to_string(),
            BackendKind::Unikernel,
            "172.44.0.2".parse().unwrap(),
            Some(0),
            InstanceHandle::Container("unused".to_string()),
        )
    }

    #[test]
    fn new_instance_starts_booting() {
        let inst = sample();
        assert_eq!(inst.state(), LifecycleState::Booting);
    }

    #[test]
    fn state_transitions_are_observable() {
        let inst = sample();
        inst.set_state(LifecycleState::Ready);
        assert_eq!(inst.state(), LifecycleState::Ready);
        inst.set_state(LifecycleState::Busy);
        assert_eq!(inst.state(), LifecycleState::Busy);
        inst.set_state(LifecycleState::Ready);
        assert_eq!(inst.state(), LifecycleState::Ready);
        inst.set_state(LifecycleState::Terminated);
        assert_eq!(inst.state(), LifecycleState::Terminated);
    }

    #[test]
    fn take_handle_is_idempotent() {
        let inst = sample();
        assert!(inst.take_handle().is_some());
        assert!(inst.take_handle().is_none());
    }

    #[test]
    fn container_id_only_reported_for_container_backend() {
        let inst = sample();
        assert_eq!(inst.container_id(), None);

        let container = Instance::new(
            "c-uuid".to_string(),
            "pi".to_string(),
            BackendKind::Container,
            "172.44.0.3".parse().unwrap(),
            None,
            InstanceHandle::Container("c-uuid".to_string()),
        );
        assert_eq!(container.container_id(), Some("c-uuid"));
    }
}
