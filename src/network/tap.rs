//! TAP device create/destroy, attached to the host bridge.

use std::process::Command;

use tracing::{debug, info};

use super::{run_checked, NetworkError};

/// Create a TAP device, enslave it to `bridge_name`, and bring it up.
pub fn add_tap(tap_name: &str, bridge_name: &str) -> Result<(), NetworkError> {
    info!(tap = tap_name, bridge = bridge_name, "Creating TAP device");

    run_checked(
        Command::new("ip").args(["tuntap", "add", "dev", tap_name, "mode", "tap"]),
        |stderr| NetworkError::TapCreateFailed {
            name: tap_name.to_string(),
            stderr,
        },
    )?;

    run_checked(
        Command::new("ip").args(["link", "set", "dev", tap_name, "master", bridge_name]),
        |stderr| NetworkError::TapCreateFailed {
            name: tap_name.to_string(),
            stderr,
        },
    )?;

    run_checked(
        Command::new("ip").args(["link", "set", "dev", tap_name, "up"]),
        |stderr| NetworkError::TapCreateFailed {
            name: tap_name.to_string(),
            stderr,
        },
    )?;

    debug!(tap = tap_name, "TAP device up");
    Ok(())
}

/// Bring a TAP device down and delete it.
pub fn delete_tap(name: &str) -> Result<(), NetworkError> {
    info!(tap = name, "Deleting TAP device");

    run_checked(
        Command::new("ip").args(["link", "set", "dev", name, "down"]),
        |stderr| NetworkError::TapDeleteFailed {
            name: name.to_string(),
            stderr,
        },
    )?;

    run_checked(
        Command::new("ip").args(["tuntap", "del", "dev", name, "mode", "tap"]),
        |stderr| NetworkError::TapDeleteFailed {
            name: name.to_string(),
            stderr,
        },
    )
}
