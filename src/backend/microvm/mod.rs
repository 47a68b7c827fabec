//! MicroVM backend: boots a Firecracker-style VMM behind a Unix socket.
//!
//! Obtains a TAP and a random MAC, attaches the TAP to the host bridge,
//! allocates an IP, then configures the VMM with a kernel image, a single
//! ext4 root filesystem, 1 vCPU, 50 MiB RAM, and one static network
//! interface bound to the TAP.

mod api;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use crate::allocator::{IpAllocator, TapAllocator};
use crate::instance::{Instance, InstanceHandle};
use crate::network;

use self::api::FirecrackerClient;
use self::config::{BootSource, DriveConfig, MachineConfig, NetworkInterface};

use super::{Backend, BackendError, LaunchedInstance};

const VCPU_COUNT: u8 = 1;
const MEM_SIZE_MIB: u32 = 50;
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MicroVmBackend {
    ip_allocator: Arc<IpAllocator>,
    tap_allocator: Arc<TapAllocator>,
    bridge_name: String,
    tap_prefix: String,
    catalog_dir: PathBuf,
    vmm_binary: PathBuf,
    run_dir: PathBuf,
}

impl MicroVmBackend {
    pub fn new(
        ip_allocator: Arc<IpAllocator>,
        tap_allocator: Arc<TapAllocator>,
        bridge_name: String,
        tap_prefix: String,
        catalog_dir: PathBuf,
    ) -> Self {
        Self {
            ip_allocator,
            tap_allocator,
            bridge_name,
            tap_prefix,
            catalog_dir,
            vmm_binary: PathBuf::from("./firecracker"),
            run_dir: std::env::temp_dir().join("hyperfaasd"),
        }
    }

    fn kernel_path(&self) -> PathBuf {
        self.catalog_dir.join("microvms").join("vmlinux")
    }

    fn rootfs_path(&self, function: &str) -> PathBuf {
        self.catalog_dir
            .join("microvms")
            .join(function)
            .join("rootfs.ext4")
    }
}

#[async_trait::async_trait]
impl Backend for MicroVmBackend {
    async fn launch(&self, function: &str) -> Result<LaunchedInstance, BackendError> {
        let tap_index = self.tap_allocator.next();
        let tap_name = format!("{}{}", self.tap_prefix, tap_index);
        let mac = network::random_mac_address();

        network::add_tap(&tap_name, &self.bridge_name).map_err(|source| BackendError::Network {
            function: function.to_string(),
            source,
        })?;
        self.tap_allocator.mark_live(tap_index);

        let ip = self
            .ip_allocator
            .next()
            .map_err(|_| BackendError::AddressSpaceExhausted {
                function: function.to_string(),
            })?;

        let kernel_path = self.kernel_path();
        let rootfs_path = self.rootfs_path(function);
        if !rootfs_path.exists() {
            return Err(BackendError::MissingAsset {
                path: rootfs_path.display().to_string(),
            });
        }

        std::fs::create_dir_all(&self.run_dir).map_err(|source| BackendError::Io {
            function: function.to_string(),
            source,
        })?;
        let socket_path = self.run_dir.join(format!("{tap_name}.sock"));
        let _ = std::fs::remove_file(&socket_path);

        info!(function, tap = %tap_name, %ip, "Launching microVM");

        let child = Command::new(&self.vmm_binary)
            .arg("--api-sock")
            .arg(&socket_path)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Io {
                function: function.to_string(),
                source,
            })?;

        let deadline = tokio::time::Instant::now() + SOCKET_WAIT_TIMEOUT;
        while !socket_path.exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        if !socket_path.exists() {
            return Err(BackendError::LaunchFailed {
                function: function.to_string(),
                reason: "firecracker API socket never appeared".to_string(),
            });
        }

        let client = FirecrackerClient::new(&socket_path);
        client
            .put_machine_config(&MachineConfig::new(VCPU_COUNT, MEM_SIZE_MIB))
            .await
            .map_err(|e| BackendError::LaunchFailed {
                function: function.to_string(),
                reason: e.to_string(),
            })?;
        client
            .put_boot_source(&BootSource::new(kernel_path))
            .await
            .map_err(|e| BackendError::LaunchFailed {
                function: function.to_string(),
                reason: e.to_string(),
            })?;
        client
            .put_drive(&DriveConfig::root_disk(rootfs_path))
            .await
            .map_err(|e| BackendError::LaunchFailed {
                function: function.to_string(),
                reason: e.to_string(),
            })?;
        client
            .put_network_interface(&NetworkInterface::new("eth0", &tap_name, &mac))
            .await
            .map_err(|e| BackendError::LaunchFailed {
                function: function.to_string(),
                reason: e.to_string(),
            })?;
        client.start_instance().await.map_err(|e| BackendError::LaunchFailed {
            function: function.to_string(),
            reason: e.to_string(),
        })?;

        Ok(LaunchedInstance {
            id: ip.to_string(),
            ip,
            tap_index: Some(tap_index),
            handle: InstanceHandle::Process(child),
        })
    }

    async fn teardown(&self, instance: &Instance) -> Result<(), BackendError> {
        if let Some(InstanceHandle::Process(mut child)) = instance.take_handle() {
            if let Err(e) = child.kill().await {
                warn!(instance = %instance.id, error = %e, "failed to kill microVM process");
            }
        }
        if let Some(index) = instance.tap_index {
            let tap_name = format!("{}{}", self.tap_prefix, index);
            if let Err(e) = network::delete_tap(&tap_name) {
                warn!(tap = %tap_name, error = %e, "failed to delete TAP device");
            }
            self.tap_allocator.mark_released(index);
        }
        Ok(())
    }
}
