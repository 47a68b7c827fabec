//! Startup and shutdown sequencing for the daemon process.
//!
//! Startup: verify host prerequisites, build the `Controller`, bring up the
//! host bridge (VM/unikernel modes only), register the catalog's pools, and
//! serve HTTP until a shutdown signal arrives. Shutdown tears every live
//! instance down before the process exits, following spec'd ordering rather
//! than letting `Drop` impls race each other on process exit.

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;

use anyhow::{bail, Result};
use tracing::info;

use crate::config::Config;
use crate::network;
use crate::state::Controller;

/// `/dev/kvm` must be writable by this process for the microVM and unikernel
/// backends (both shell out to KVM-backed hypervisors); the container
/// backend has no such requirement but we still only run as root, since
/// bridge/TAP/CNI setup all need it regardless of backend.
fn check_host_prerequisites(config: &Config) -> Result<()> {
    if !is_root() {
        bail!("hyperfaasd must run as root to manage host networking");
    }

    if config.uses_host_network() {
        let kvm = std::path::Path::new("/dev/kvm");
        let meta = std::fs::metadata(kvm)
            .map_err(|e| anyhow::anyhow!("/dev/kvm is required for backend {:?}: {e}", config.backend))?;
        let writable = meta.permissions().mode() & 0o200 != 0;
        if !writable {
            bail!("/dev/kvm is not writable");
        }
    }

    Ok(())
}

fn is_root() -> bool {
    // SAFETY: getuid takes no arguments and cannot fail.
    unsafe { libc::getuid() == 0 }
}

pub async fn run(config: Config) -> Result<()> {
    check_host_prerequisites(&config)?;

    let controller = Controller::new(config.clone())?;

    if config.uses_host_network() {
        network::add_bridge(&config.bridge_name, &config.bridge_ip, config.bridge_mask)?;
    }

    controller.register_catalog_pools();
    info!(
        functions = controller.catalog().functions().len(),
        "Catalog scanned, pools registered"
    );

    let app = crate::api::create_router(controller.clone());
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "HTTP server exited with an error");
    }

    controller.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
