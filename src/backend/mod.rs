//! Polymorphic sandbox launcher.
//!
//! A backend exposes one capability set: `launch` boots a sandbox for a
//! named function and returns its assigned IP and OS handle; `teardown`
//! reverses it. Three variants are selected process-wide at startup from
//! `Config::backend`. The dispatcher and lifecycle controller are written
//! against the `Backend` trait only — neither branches on which variant is
//! active.

mod container;
mod microvm;
mod unikernel;

pub use container::ContainerBackend;
pub use microvm::MicroVmBackend;
pub use unikernel::UnikernelBackend;

use std::net::Ipv4Addr;

use async_trait::async_trait;
use thiserror::Error;

use crate::instance::{Instance, InstanceHandle};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("address space exhausted while provisioning {function}")]
    AddressSpaceExhausted { function: String },

    #[error("network setup failed for {function}: {source}")]
    Network {
        function: String,
        #[source]
        source: crate::network::NetworkError,
    },

    #[error("function asset missing at {path}")]
    MissingAsset { path: String },

    #[error("failed to launch sandbox for {function}: {reason}")]
    LaunchFailed { function: String, reason: String },

    #[error("io error launching {function}: {source}")]
    Io {
        function: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything a successful `launch()` hands back to the provisioner so it
/// can build the `Instance` record and register it with the controller.
pub struct LaunchedInstance {
    pub id: String,
    pub ip: Ipv4Addr,
    pub tap_index: Option<i64>,
    pub handle: InstanceHandle,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Boot a fresh sandbox for `function`. Does not wait for the in-guest
    /// agent's readiness post — that is the provisioner's job (see
    /// `pool::Pool`'s factory-on-miss sequence).
    async fn launch(&self, function: &str) -> Result<LaunchedInstance, BackendError>;

    /// Stop the sandbox and release whatever host resources it holds (TAP,
    /// network namespace). Idempotent: called at most once per instance in
    /// practice, but must not panic if the handle was already taken.
    async fn teardown(&self, instance: &Instance) -> Result<(), BackendError>;
}
