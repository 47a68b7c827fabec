//! Unikernel backend: boots a unikernel image under QEMU with KVM.
//!
//! TAP/IP/MAC setup mirrors the microVM backend exactly; the difference is
//! the launcher (a QEMU process instead of a Firecracker socket) and the
//! guest networking configuration, which is passed on the kernel command
//! line rather than through a VMM API, since unikernel images have no
//! userspace DHCP client.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{info, warn};

use crate::allocator::{IpAllocator, TapAllocator};
use crate::instance::{Instance, InstanceHandle};
use crate::network;

use super::{Backend, BackendError, LaunchedInstance};

const VCPU_COUNT: &str = "1";
const MEM_SIZE_MIB: &str = "10M";

pub struct UnikernelBackend {
    ip_allocator: Arc<IpAllocator>,
    tap_allocator: Arc<TapAllocator>,
    bridge_name: String,
    bridge_ip: String,
    tap_prefix: String,
    catalog_dir: PathBuf,
    qemu_binary: PathBuf,
}

impl UnikernelBackend {
    pub fn new(
        ip_allocator: Arc<IpAllocator>,
        tap_allocator: Arc<TapAllocator>,
        bridge_name: String,
        bridge_ip: String,
        tap_prefix: String,
        catalog_dir: PathBuf,
    ) -> Self {
        Self {
            ip_allocator,
            tap_allocator,
            bridge_name,
            bridge_ip,
            tap_prefix,
            catalog_dir,
            qemu_binary: PathBuf::from("qemu-system-x86_64"),
        }
    }

    fn image_path(&self, function: &str) -> PathBuf {
        self.catalog_dir
            .join("unikernels")
            .join(function)
            .join("build")
            .join("httpreply_kvm-x86_64")
    }
}

#[async_trait::async_trait]
impl Backend for UnikernelBackend {
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

        let image_path = self.image_path(function);
        if !image_path.exists() {
            return Err(BackendError::MissingAsset {
                path: image_path.display().to_string(),
            });
        }

        let kernel_cmdline = format!(
            "netdev.ipv4_addr={ip} netdev.ipv4_gw_addr={bridge_ip} netdev.ipv4_subnet_mask=255.255.255.0 -- {bridge_ip}",
            ip = ip,
            bridge_ip = self.bridge_ip,
        );

        info!(function, tap = %tap_name, %ip, "Launching unikernel");

        let child = Command::new(&self.qemu_binary)
            .arg("-enable-kvm")
            .args(["-cpu", "host"])
            .args(["-smp", VCPU_COUNT])
            .args(["-m", MEM_SIZE_MIB])
            .args(["-nographic"])
            .args([
                "-netdev",
                &format!("tap,id=net0,ifname={tap_name},script=no,downscript=no"),
            ])
            .args(["-device", &format!("virtio-net-pci,netdev=net0,mac={mac}")])
            .args(["-kernel", &image_path.to_string_lossy()])
            .args(["-append", &kernel_cmdline])
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BackendError::Io {
                function: function.to_string(),
                source,
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
                warn!(instance = %instance.id, error = %e, "failed to kill unikernel process");
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
