//! Linux bridge create/destroy via `ip` / `brctl`.

use std::process::Command;

use tracing::{debug, info};

use super::{run_checked, NetworkError};

/// Create a Linux bridge, assign it `ip/mask`, and bring it up.
pub fn add_bridge(name: &str, ip: &str, mask: u8) -> Result<(), NetworkError> {
    info!(bridge = name, ip, mask, "Creating host bridge");

    run_checked(
        Command::new("ip").args(["link", "add", name, "type", "bridge"]),
        |stderr| NetworkError::BridgeCreateFailed {
            name: name.to_string(),
            stderr,
        },
    )?;

    run_checked(
        Command::new("ip").args(["addr", "add", &format!("{ip}/{mask}"), "dev", name]),
        |stderr| NetworkError::BridgeCreateFailed {
            name: name.to_string(),
            stderr,
        },
    )?;

    run_checked(
        Command::new("ip").args(["link", "set", "dev", name, "up"]),
        |stderr| NetworkError::BridgeCreateFailed {
            name: name.to_string(),
            stderr,
        },
    )?;

    debug!(bridge = name, "Host bridge up");
    Ok(())
}

/// Bring a bridge down and delete it.
pub fn delete_bridge(name: &str) -> Result<(), NetworkError> {
    info!(bridge = name, "Deleting host bridge");

    run_checked(
        Command::new("ip").args(["link", "set", "dev", name, "down"]),
        |stderr| NetworkError::BridgeDeleteFailed {
            name: name.to_string(),
            stderr,
        },
    )?;

    run_checked(Command::new("brctl").args(["delbr", name]), |stderr| {
        NetworkError::BridgeDeleteFailed {
            name: name.to_string(),
            stderr,
        }
    })
}
