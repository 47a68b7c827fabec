//! Process-wide shared state.
//!
//! Every allocator, index, pool, and collector this daemon treats as a
//! process singleton is grouped here into one `Controller` value,
//! constructed once at startup and handed to every Axum handler and every
//! pool's factory closure as an `Arc` clone — the same shape
//! `control-plane`'s `AppState` wraps its `Database` in.

use std::net::Ipv4Addr;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::allocator::{AllocatorError, IpAllocator, TapAllocator};
use crate::backend::{Backend, ContainerBackend, MicroVmBackend, UnikernelBackend};
use crate::catalog::Catalog;
use crate::config::{BackendKind, Config};
use crate::instance::{Instance, LifecycleState};
use crate::pool::{Pool, PoolError};
use crate::readiness::ReadinessMap;
use crate::stats::StatsCollector;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Allocator(#[from] AllocatorError),

    #[error(transparent)]
    Catalog(#[from] crate::catalog::CatalogError),
}

struct Inner {
    config: Config,
    backend: Arc<dyn Backend>,
    ip_index: DashMap<Ipv4Addr, Arc<Instance>>,
    readiness: ReadinessMap,
    pools: DashMap<String, Arc<Pool>>,
    stats: StatsCollector,
    catalog: Catalog,
    tap_allocator: Arc<TapAllocator>,
    http_client: reqwest::Client,
}

#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        let ip_allocator = Arc::new(IpAllocator::new(&config.bridge_ip)?);
        let tap_allocator = Arc::new(TapAllocator::new());
        let catalog = Catalog::scan(&config.catalog_dir, config.backend)?;

        let backend: Arc<dyn Backend> = match config.backend {
            BackendKind::MicroVm => Arc::new(MicroVmBackend::new(
                ip_allocator,
                tap_allocator.clone(),
                config.bridge_name.clone(),
                config.tap_prefix.clone(),
                config.catalog_dir.clone(),
            )),
            BackendKind::Unikernel => Arc::new(UnikernelBackend::new(
                ip_allocator,
                tap_allocator.clone(),
                config.bridge_name.clone(),
                config.bridge_ip.clone(),
                config.tap_prefix.clone(),
                config.catalog_dir.clone(),
            )),
            BackendKind::Container => Arc::new(ContainerBackend::new(config.catalog_dir.clone())),
        };

        let http_client = reqwest::Client::builder()
            .timeout(config.dispatch_timeout)
            .build()
            .expect("reqwest client configuration is valid");

        let inner = Inner {
            config,
            backend,
            ip_index: DashMap::new(),
            readiness: ReadinessMap::new(),
            pools: DashMap::new(),
            stats: StatsCollector::new(),
            catalog,
            tap_allocator,
            http_client,
        };

        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.inner.stats
    }

    pub fn tap_allocator(&self) -> &TapAllocator {
        &self.inner.tap_allocator
    }

    /// Register an empty pool for every catalog function, wired to this
    /// controller's `provision` as its factory-on-miss. Called once during
    /// startup after the catalog scan.
    pub fn register_catalog_pools(&self) {
        for function in self.inner.catalog.functions().to_vec() {
            self.register_pool(function);
        }
    }

    fn register_pool(&self, function: String) {
        let controller = self.clone();
        let pool = Pool::new(move || {
            let controller = controller.clone();
            let function = function.clone();
            async move { controller.provision(&function).await }
        });
        self.inner.pools.insert(function.clone(), Arc::new(pool));
    }

    /// Look up the pool for `function`, if the catalog knows about it.
    pub fn pool(&self, function: &str) -> Option<Arc<Pool>> {
        self.inner.pools.get(function).map(|p| p.clone())
    }

    /// The provisioning sequence: launch the backend, index
    /// the instance by IP before the agent could possibly reach `/ready`,
    /// then block until it does.
    pub async fn provision(&self, function: &str) -> Result<Arc<Instance>, PoolError> {
        let launched = self
            .inner
            .backend
            .launch(function)
            .await
            .map_err(|e| PoolError::ProvisionFailed(e.to_string()))?;

        let instance = Arc::new(Instance::new(
            launched.id,
            function.to_string(),
            self.inner.config.backend,
            launched.ip,
            launched.tap_index,
            launched.handle,
        ));

        // Ordering invariant: index before the readiness registration, both
        // of which happen before the backend's guest could have a running
        // network stack to post `/ready` from.
        self.inner.ip_index.insert(launched.ip, instance.clone());
        let ready_rx = self.inner.readiness.register(launched.ip);

        if ready_rx.await.is_err() {
            warn!(function, ip = %launched.ip, "readiness channel dropped without a signal");
            self.inner.readiness.cancel(launched.ip);
            self.inner.ip_index.remove(&launched.ip);
            if let Err(e) = self.inner.backend.teardown(&instance).await {
                warn!(function, ip = %launched.ip, error = %e, "failed to tear down instance abandoned by a dropped readiness signal");
            }
            return Err(PoolError::ProvisionFailed(
                "readiness rendezvous dropped".to_string(),
            ));
        }

        instance.set_state(LifecycleState::Ready);
        info!(function, ip = %launched.ip, "Instance ready");
        Ok(instance)
    }

    /// The readiness-handler sequence: resolve the poster's
    /// IP to its instance record, hand `ready_time - boot_time` to the stats
    /// collector, then signal the waiter exactly once.
    pub fn mark_ready(&self, ip: Ipv4Addr) -> bool {
        if let Some(instance) = self.inner.ip_index.get(&ip) {
            let elapsed = instance.boot_instant.elapsed();
            self.inner.stats.record_vm_init(elapsed.as_nanos() as i64);
        }
        self.inner.readiness.signal(ip)
    }

    pub fn instance_by_ip(&self, ip: Ipv4Addr) -> Option<Arc<Instance>> {
        self.inner.ip_index.get(&ip).map(|e| e.clone())
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.inner.http_client
    }

    pub fn all_instances(&self) -> Vec<Arc<Instance>> {
        self.inner.ip_index.iter().map(|e| e.value().clone()).collect()
    }

    pub fn provisioned_count(&self, function: &str) -> usize {
        self.inner
            .ip_index
            .iter()
            .filter(|e| e.value().function == function)
            .count()
    }

    /// The shutdown sequence: tear down every live instance,
    /// then (for VM/unikernel modes) remove any TAP devices still believed
    /// live, then delete the bridge. Runs to completion even if individual
    /// steps fail; every failure is logged and swallowed rather than
    /// aborting the rest of the sequence.
    pub async fn shutdown(&self) {
        for instance in self.all_instances() {
            if let Err(e) = self.inner.backend.teardown(&instance).await {
                warn!(instance = %instance.id, error = %e, "failed to tear down instance during shutdown");
            }
            instance.set_state(LifecycleState::Terminated);
        }

        if self.inner.config.uses_host_network() {
            for index in self.inner.tap_allocator.live_indices() {
                let tap_name = format!("{}{}", self.inner.config.tap_prefix, index);
                if let Err(e) = crate::network::delete_tap(&tap_name) {
                    warn!(tap = %tap_name, error = %e, "failed to delete TAP device during shutdown");
                }
            }

            if let Err(e) = crate::network::delete_bridge(&self.inner.config.bridge_name) {
                warn!(bridge = %self.inner.config.bridge_name, error = %e, "failed to delete bridge during shutdown");
            }
        }

        info!("Shutdown sequence complete");
    }
}
