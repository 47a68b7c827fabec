//! Configuration for the hypervisor control plane.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Sandbox backend selected process-wide via `OFHTYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    MicroVm,
    Unikernel,
    Container,
}

impl BackendKind {
    fn from_env_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "MICROVM" => BackendKind::MicroVm,
            "CONTAINER" => BackendKind::Container,
            // Unikernel is the default and the fallback for any other value,
            // matching the source's `default/other` selector.
            _ => BackendKind::Unikernel,
        }
    }

    /// Subdirectory of the catalog directory this backend's functions live under.
    pub fn catalog_subdir(&self) -> &'static str {
        match self {
            BackendKind::MicroVm => "microvms",
            BackendKind::Unikernel => "unikernels",
            BackendKind::Container => "containers",
        }
    }
}

/// Daemon configuration, loaded once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Selected sandbox backend.
    pub backend: BackendKind,

    /// Address to listen on for HTTP connections.
    pub listen_addr: SocketAddr,

    /// Directory containing `microvms/`, `unikernels/`, `containers/`.
    pub catalog_dir: PathBuf,

    /// Host bridge name (microVM/unikernel modes only).
    pub bridge_name: String,

    /// Host bridge IPv4 address.
    pub bridge_ip: String,

    /// Host bridge netmask, in CIDR bits.
    pub bridge_mask: u8,

    /// TAP device name prefix.
    pub tap_prefix: String,

    /// If true, invoked instances are never returned to their pool.
    pub disable_vm_reuse: bool,

    /// Bound on the downstream `/invoke` call.
    pub dispatch_timeout: Duration,

    /// Log level fallback when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let backend = std::env::var("OFHTYPE")
            .map(|s| BackendKind::from_env_str(&s))
            .unwrap_or(BackendKind::Unikernel);

        let listen_addr = std::env::var("OFH_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()?;

        let catalog_dir = std::env::var("OFH_CATALOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let bridge_name = std::env::var("OFH_BRIDGE_NAME").unwrap_or_else(|_| "ofhbr".to_string());
        let bridge_ip =
            std::env::var("OFH_BRIDGE_IP").unwrap_or_else(|_| "172.44.0.1".to_string());
        let bridge_mask = std::env::var("OFH_BRIDGE_MASK")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(16);
        let tap_prefix = std::env::var("OFH_TAP_PREFIX").unwrap_or_else(|_| "ofhtap".to_string());

        let disable_vm_reuse = std::env::var("DISABLE_VM_REUSE")
            .map(|v| v.eq_ignore_ascii_case("TRUE"))
            .unwrap_or(false);

        let dispatch_timeout_ms = std::env::var("DISPATCH_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30_000u64);

        let log_level = std::env::var("OFH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            backend,
            listen_addr,
            catalog_dir,
            bridge_name,
            bridge_ip,
            bridge_mask,
            tap_prefix,
            disable_vm_reuse,
            dispatch_timeout: Duration::from_millis(dispatch_timeout_ms),
            log_level,
        })
    }

    /// Whether the selected backend requires the host bridge/TAP network.
    pub fn uses_host_network(&self) -> bool {
        matches!(self.backend, BackendKind::MicroVm | BackendKind::Unikernel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_defaults_to_unikernel() {
        assert_eq!(BackendKind::from_env_str("bogus"), BackendKind::Unikernel);
        assert_eq!(BackendKind::from_env_str(""), BackendKind::Unikernel);
    }

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!(BackendKind::from_env_str("microvm"), BackendKind::MicroVm);
        assert_eq!(BackendKind::from_env_str("MicroVM"), BackendKind::MicroVm);
        assert_eq!(
            BackendKind::from_env_str("container"),
            BackendKind::Container
        );
    }

    #[test]
    fn catalog_subdir_matches_on_disk_layout() {
        assert_eq!(BackendKind::MicroVm.catalog_subdir(), "microvms");
        assert_eq!(BackendKind::Unikernel.catalog_subdir(), "unikernels");
        assert_eq!(BackendKind::Container.catalog_subdir(), "containers");
    }
}
