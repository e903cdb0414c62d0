//! Builders to construct the gate components from configuration.
//!
//! Store and engine clients outlive every request, so they are created once here
//! and shared by both controllers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{GateConfig, StoreBackendConfig};
use crate::core::{
    AdmissionController, AuditSink, GateError, ReleaseController, SemaphoreStore, SharedAuditSink,
    TimeoutStore, WorkflowLauncher,
};
use crate::infra::queue::JobQueue;
use crate::infra::store::{InMemorySemaphoreStore, SqliteSemaphoreStore};
use crate::runtime::{BatchConsumer, RetryPolicy};

/// Store handle shared by the controllers.
pub type SharedStore = Arc<dyn SemaphoreStore>;

/// Open the configured store backend, wrapped with the configured request timeout.
pub fn build_store(cfg: &GateConfig) -> Result<SharedStore, GateError> {
    let backend: SharedStore = match &cfg.store {
        StoreBackendConfig::InMemory => Arc::new(InMemorySemaphoreStore::new()),
        StoreBackendConfig::Sqlite { directory } => Arc::new(SqliteSemaphoreStore::open(
            directory,
            &cfg.table_name,
            cfg.store_timeout(),
        )?),
    };
    Ok(Arc::new(TimeoutStore::new(backend, cfg.store_timeout())))
}

/// Assembles a [`Gate`] from configuration.
pub struct GateBuilder {
    config: GateConfig,
    audit: Option<SharedAuditSink>,
}

impl GateBuilder {
    /// Start from a configuration.
    pub const fn new(config: GateConfig) -> Self {
        Self {
            config,
            audit: None,
        }
    }

    /// Configuration being built.
    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Audit sink shared by both controllers.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Arc::new(Mutex::new(audit)));
        self
    }

    /// Validate the configuration, open the store, and wire both controllers.
    pub fn build<L: WorkflowLauncher>(self, launcher: L) -> Result<Gate<L>, GateError> {
        self.config.validate().map_err(GateError::Config)?;
        let store = build_store(&self.config)?;
        Ok(self.assemble(store, launcher))
    }

    /// Wire both controllers around an already opened store.
    pub fn build_with_store<L: WorkflowLauncher>(
        self,
        store: SharedStore,
        launcher: L,
    ) -> Result<Gate<L>, GateError> {
        self.config.validate().map_err(GateError::Config)?;
        Ok(self.assemble(store, launcher))
    }

    fn assemble<L: WorkflowLauncher>(self, store: SharedStore, launcher: L) -> Gate<L> {
        let mut admission = AdmissionController::new(Arc::clone(&store), launcher)
            .with_naming(self.config.execution_naming);
        let mut release = ReleaseController::new(Arc::clone(&store));
        if let Some(audit) = &self.audit {
            admission = admission.with_shared_audit(Arc::clone(audit));
            release = release.with_shared_audit(Arc::clone(audit));
        }
        tracing::info!(
            "gate built: table={} target={} queue={}",
            self.config.table_name,
            self.config.workflow_target,
            self.config.queue_name
        );
        Gate {
            admission: Arc::new(admission),
            release: Arc::new(release),
            store,
            config: self.config,
        }
    }
}

/// Wired admission and release controllers over one shared store.
pub struct Gate<L> {
    /// Queue-facing controller.
    pub admission: Arc<AdmissionController<SharedStore, L>>,
    /// Completion-facing controller.
    pub release: Arc<ReleaseController<SharedStore>>,
    store: SharedStore,
    config: GateConfig,
}

impl<L: WorkflowLauncher> Gate<L> {
    /// The shared store.
    pub const fn store(&self) -> &SharedStore {
        &self.store
    }

    /// The configuration the gate was built from.
    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Release retry policy derived from configuration.
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.release_max_attempts,
            backoff: self.config.release_backoff(),
        }
    }

    /// A consumer over `queue` using the configured batch size.
    pub fn consumer<Q: JobQueue + Send>(
        &self,
        name: impl Into<String>,
        queue: Arc<Mutex<Q>>,
    ) -> BatchConsumer<Q, SharedStore, L> {
        BatchConsumer::new(name, queue, Arc::clone(&self.admission), self.config.batch_size)
    }

    /// Tear down the store client. Call once, on process shutdown.
    pub async fn shutdown(&self) -> Result<(), GateError> {
        tracing::info!("shutting down gate for table {}", self.config.table_name);
        self.store.shutdown().await
    }
}
