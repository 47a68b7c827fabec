//! Container networking via a CNI-compatible "bridge" plugin.
//!
//! The container backend doesn't attach a TAP/bridge itself; it delegates
//! to a CNI plugin binary, passing the usual `CNI_*` environment variables
//! and the network config JSON on stdin, and parses the plugin's result
//! JSON for the assigned IPv4 address.

use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info};

use super::NetworkError;

/// Paths the CNI bridge plugin is configured from.
#[derive(Debug, Clone)]
pub struct CniConfig {
    /// Path to the CNI plugin binary (e.g. `./containers/bridge`).
    pub plugin_path: PathBuf,
    /// Path to the CNI network config JSON (e.g. `./containers/cni_config.json`).
    pub net_config_path: PathBuf,
    /// Container network interface name inside the namespace.
    pub if_name: String,
}

impl CniConfig {
    pub fn new(containers_dir: impl AsRef<Path>) -> Self {
        let dir = containers_dir.as_ref();
        Self {
            plugin_path: dir.join("bridge"),
            net_config_path: dir.join("cni_config.json"),
            if_name: "eth0".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CniResult {
    ips: Vec<CniIpResult>,
}

#[derive(Debug, Deserialize)]
struct CniIpResult {
    address: String,
}

/// Create a network namespace named after `container_id` and invoke the CNI
/// plugin with `CNI_COMMAND=ADD`, returning the plugin-assigned IPv4
/// (stripped of its mask).
pub fn bridge_container(config: &CniConfig, container_id: &str) -> Result<Ipv4Addr, NetworkError> {
    info!(container_id, "Provisioning container network namespace");

    run_checked_io(
        Command::new("ip").args(["netns", "add", container_id]),
        container_id,
    )?;

    let output = invoke_plugin(config, container_id, "ADD")?;

    let result: CniResult = serde_json::from_slice(&output).map_err(|_| NetworkError::CniFailed {
        container_id: container_id.to_string(),
        command: "ADD",
        stderr: String::from_utf8_lossy(&output).to_string(),
    })?;

    let address = result
        .ips
        .first()
        .map(|ip| ip.address.split('/').next().unwrap_or(&ip.address).to_string())
        .ok_or(NetworkError::CniNoAddress)?;

    let ip: Ipv4Addr = address.parse().map_err(|_| NetworkError::CniNoAddress)?;
    debug!(container_id, %ip, "Container network namespace ready");
    Ok(ip)
}

/// Invoke the CNI plugin with `CNI_COMMAND=DEL` and delete the namespace.
pub fn unbridge_container(config: &CniConfig, container_id: &str) -> Result<(), NetworkError> {
    info!(container_id, "Tearing down container network namespace");

    invoke_plugin(config, container_id, "DEL")?;

    run_checked_io(
        Command::new("ip").args(["netns", "delete", container_id]),
        container_id,
    )
}

fn invoke_plugin(
    config: &CniConfig,
    container_id: &str,
    cni_command: &'static str,
) -> Result<Vec<u8>, NetworkError> {
    let net_config = std::fs::read(&config.net_config_path)?;

    let mut child = Command::new(&config.plugin_path)
        .env("CNI_COMMAND", cni_command)
        .env("CNI_CONTAINERID", container_id)
        .env("CNI_NETNS", format!("/var/run/netns/{container_id}"))
        .env("CNI_IFNAME", &config.if_name)
        .env("CNI_PATH", config.plugin_path.parent().unwrap_or(Path::new(".")))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    child
        .stdin
        .as_mut()
        .expect("stdin piped")
        .write_all(&net_config)?;

    let output = child.wait_with_output()?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(NetworkError::CniFailed {
            container_id: container_id.to_string(),
            command: cni_command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn run_checked_io(mut cmd: Command, container_id: &str) -> Result<(), NetworkError> {
    let output = cmd.output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(NetworkError::CniFailed {
            container_id: container_id.to_string(),
            command: "netns",
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cni_config_derives_expected_paths() {
        let config = CniConfig::new("./containers");
        assert_eq!(config.plugin_path, PathBuf::from("./containers/bridge"));
        assert_eq!(
            config.net_config_path,
            PathBuf::from("./containers/cni_config.json")
        );
    }

    #[test]
    fn cni_result_parses_stripped_ip() {
        let raw = br#"{"ips":[{"address":"10.88.0.5/16"}]}"#;
        let result: CniResult = serde_json::from_slice(raw).unwrap();
        let ip = result.ips[0].address.split('/').next().unwrap();
        assert_eq!(ip, "10.88.0.5");
    }
}
