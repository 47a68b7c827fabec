//! Host network manager.
//!
//! Creates and tears down the Linux bridge and TAP devices that microVM and
//! unikernel sandboxes attach to, and drives the CNI bridge plugin used by
//! the container backend. Every operation shells out to the host's `ip` /
//! `brctl` tools (or the CNI plugin binary) and surfaces stderr on failure;
//! none of these operations are idempotent, so the caller (the lifecycle
//! controller) is responsible for not double-creating.

mod bridge;
mod cni;
mod mac;
mod tap;

pub use bridge::{add_bridge, delete_bridge};
pub use cni::{bridge_container, unbridge_container, CniConfig};
pub use mac::random_mac_address;
pub use tap::{add_tap, delete_tap};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to create bridge {name}: {stderr}")]
    BridgeCreateFailed { name: String, stderr: String },

    #[error("failed to delete bridge {name}: {stderr}")]
    BridgeDeleteFailed { name: String, stderr: String },

    #[error("failed to create tap {name}: {stderr}")]
    TapCreateFailed { name: String, stderr: String },

    #[error("failed to delete tap {name}: {stderr}")]
    TapDeleteFailed { name: String, stderr: String },

    #[error("CNI plugin failed for container {container_id} ({command}): {stderr}")]
    CniFailed {
        container_id: String,
        command: &'static str,
        stderr: String,
    },

    #[error("CNI plugin returned no usable IPv4 address")]
    CniNoAddress,

    #[error("failed to set up network namespace for {container_id}: {0}", container_id = .container_id)]
    NamespaceFailed { container_id: String, source: std::io::Error },

    #[error("command execution failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Run a host command and turn a non-zero exit into the given error.
fn run_checked<F>(mut cmd: std::process::Command, err: F) -> Result<(), NetworkError>
where
    F: FnOnce(String) -> NetworkError,
{
    let output = cmd.output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(err(String::from_utf8_lossy(&output.stderr).trim().to_string()))
    }
}
