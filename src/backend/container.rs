//! Container backend: runs functions under a userspace container runtime,
//! networked via a CNI "bridge" plugin rather than the TAP/bridge pair the
//! VM backends use.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use crate::instance::{Instance, InstanceHandle};
use crate::network::{self, CniConfig};

use super::{Backend, BackendError, LaunchedInstance};

pub struct ContainerBackend {
    catalog_dir: PathBuf,
    cni: CniConfig,
    runtime_binary: PathBuf,
}

impl ContainerBackend {
    pub fn new(catalog_dir: PathBuf) -> Self {
        let containers_dir = catalog_dir.join("containers");
        Self {
            cni: CniConfig::new(&containers_dir),
            catalog_dir,
            runtime_binary: PathBuf::from("runc"),
        }
    }

    fn rootfs_template(&self, function: &str) -> PathBuf {
        self.catalog_dir
            .join("containers")
            .join(function)
            .join("rootfs")
    }

    fn config_template(&self, function: &str) -> PathBuf {
        self.catalog_dir
            .join("containers")
            .join(function)
            .join("config-template.json")
    }

    fn bundle_dir(&self, container_id: &str) -> PathBuf {
        std::env::temp_dir().join("hyperfaasd").join(container_id)
    }
}

#[async_trait::async_trait]
impl Backend for ContainerBackend {
    async fn launch(&self, function: &str) -> Result<LaunchedInstance, BackendError> {
        let container_id = Uuid::new_v4().to_string();

        let rootfs_template = self.rootfs_template(function);
        let config_template = self.config_template(function);
        if !rootfs_template.exists() {
            return Err(BackendError::MissingAsset {
                path: rootfs_template.display().to_string(),
            });
        }
        if !config_template.exists() {
            return Err(BackendError::MissingAsset {
                path: config_template.display().to_string(),
            });
        }

        let ip = network::bridge_container(&self.cni, &container_id).map_err(|source| {
            BackendError::Network {
                function: function.to_string(),
                source,
            }
        })?;

        let bundle_dir = self.bundle_dir(&container_id);
        std::fs::create_dir_all(&bundle_dir).map_err(|source| BackendError::Io {
            function: function.to_string(),
            source,
        })?;

        let bundle_rootfs = bundle_dir.join("rootfs");
        copy_dir_recursive(&rootfs_template, &bundle_rootfs).map_err(|source| BackendError::Io {
            function: function.to_string(),
            source,
        })?;

        let template = std::fs::read_to_string(&config_template).map_err(|source| BackendError::Io {
            function: function.to_string(),
            source,
        })?;
        let rendered = template.replace("<netns>", &container_id);
        std::fs::write(bundle_dir.join("config.json"), rendered).map_err(|source| BackendError::Io {
            function: function.to_string(),
            source,
        })?;

        info!(function, container_id = %container_id, %ip, "Launching container");

        // `-d` detaches runc's own process once the container is up, rather
        // than leaving it as the container's foreground supervisor — that
        // way we don't need to keep a `Child` handle alive for the
        // container's whole lifetime, and teardown is a plain `runc
        // kill`/`runc delete` pair.
        let status = Command::new(&self.runtime_binary)
            .arg("run")
            .arg("-d")
            .arg("--bundle")
            .arg(&bundle_dir)
            .arg(&container_id)
            .status()
            .await
            .map_err(|source| BackendError::Io {
                function: function.to_string(),
                source,
            })?;

        if !status.success() {
            return Err(BackendError::LaunchFailed {
                function: function.to_string(),
                reason: format!("runc run exited with {status}"),
            });
        }

        Ok(LaunchedInstance {
            id: container_id.clone(),
            ip,
            tap_index: None,
            handle: InstanceHandle::Container(container_id),
        })
    }

    async fn teardown(&self, instance: &Instance) -> Result<(), BackendError> {
        // The handle is still taken so a second teardown attempt is a no-op.
        let _ = instance.take_handle();

        if let Some(container_id) = instance.container_id() {
            match Command::new(&self.runtime_binary)
                .arg("kill")
                .arg(container_id)
                .arg("KILL")
                .status()
                .await
            {
                Ok(status) if !status.success() => {
                    warn!(container_id, %status, "runc kill exited with a non-zero status")
                }
                Err(e) => warn!(container_id, error = %e, "failed to run runc kill"),
                Ok(_) => {}
            }
            match Command::new(&self.runtime_binary)
                .arg("delete")
                .arg("--force")
                .arg(container_id)
                .status()
                .await
            {
                Ok(status) if !status.success() => {
                    warn!(container_id, %status, "runc delete exited with a non-zero status")
                }
                Err(e) => warn!(container_id, error = %e, "failed to run runc delete"),
                Ok(_) => {}
            }

            if let Err(e) = network::unbridge_container(&self.cni, container_id) {
                warn!(container_id, error = %e, "failed to unbridge container network namespace");
            }
            let _ = std::fs::remove_dir_all(self.bundle_dir(container_id));
        }
        Ok(())
    }
}

fn copy_dir_recursive(src: &std::path::Path, dst: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dst_path = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path)?;
        } else {
            std::fs::copy(entry.path(), &dst_path)?;
        }
    }
    Ok(())
}
