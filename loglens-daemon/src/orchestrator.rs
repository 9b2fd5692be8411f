//! Process composition -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the composition root of `loglens-daemon`.
//! It turns a validated [`LoglensConfig`] into the agent's shared
//! components and drives their lifecycle.
//!
//! # Startup Order
//!
//! 1. PID file
//! 2. Autostart (services persisted as enabled and started)
//! 3. Reconciliation loop
//!
//! # Shutdown Order
//!
//! 1. Reconciliation loop (no new starts)
//! 2. Every live monitor task, under one bounded join deadline
//! 3. PID file removal

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use loglens_agent::{
    AgentConfig, DisabledBackend, EvtxFileReader, Forwarder, InferenceBackend, LlamaServerBackend,
    MonitorContext, Reconciler, ServiceRegistry, StateStore, TemplateCatalog, Transformer,
};
use loglens_core::config::{InferenceConfig, LoglensConfig};

use crate::metrics_server;

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: LoglensConfig,
    agent: Arc<AgentConfig>,
    store: Arc<StateStore>,
    catalog: Arc<TemplateCatalog>,
    reconciler: Arc<Reconciler>,
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read, parsed
    /// or validated, or if a component fails to initialize.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LoglensConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: LoglensConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let agent = AgentConfig::from_core(&config.agent);
        agent
            .validate()
            .map_err(|e| anyhow::anyhow!("agent config validation failed: {}", e))?;
        let agent = Arc::new(agent);

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let store = Arc::new(StateStore::new(&agent.data_dir));
        let catalog = Arc::new(TemplateCatalog::new(&agent.template_dir));
        match catalog.reload().await {
            Ok(count) => tracing::info!(
                dir = %agent.template_dir.display(),
                count = count,
                "templates loaded"
            ),
            Err(e) => tracing::warn!(
                dir = %agent.template_dir.display(),
                error = %e,
                "template directory unavailable, starting without templates"
            ),
        }

        let backend = build_backend(&config.inference)?;
        tracing::info!(backend = backend.name(), "inference backend ready");

        let transformer = Arc::new(Transformer::new(
            backend,
            agent.transform_timeout,
            agent.hostname.clone(),
        ));
        let ctx = MonitorContext {
            config: Arc::clone(&agent),
            store: Arc::clone(&store),
            transformer,
            forwarder: Arc::new(Forwarder::new(agent.forward_connect_timeout)),
            event_reader: Arc::new(EvtxFileReader),
        };
        let registry = Arc::new(ServiceRegistry::new(ctx));
        let reconciler = Arc::new(Reconciler::new(
            registry,
            Arc::clone(&store),
            Arc::clone(&catalog),
        ));

        tracing::info!(
            data_dir = %agent.data_dir.display(),
            hostname = %agent.hostname,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            agent,
            store,
            catalog,
            reconciler,
            start_time: Instant::now(),
        })
    }

    /// Start the agent and block until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal = signal, "shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
            }
        })
        .await
    }

    /// Start the agent and run until `shutdown` completes.
    ///
    /// The PID file is removed on every exit path after it was written.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let pid_file = self.pid_file();
        if let Some(path) = &pid_file {
            write_pid_file(path)?;
        }

        let result = self.serve(shutdown).await;

        if let Some(path) = &pid_file {
            remove_pid_file(path);
        }
        result
    }

    async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let started = self
            .reconciler
            .autostart()
            .await
            .map_err(|e| anyhow::anyhow!("autostart failed: {}", e))?;
        tracing::info!(services = started, "autostart complete");

        let cancel = CancellationToken::new();
        let reconciler = Arc::clone(&self.reconciler);
        let interval = self.agent.reconcile_interval;
        let loop_cancel = cancel.clone();
        let reconcile_task =
            tokio::spawn(async move { reconciler.run(interval, loop_cancel).await });

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| metrics_server::spawn_uptime_updater(self.start_time, cancel.clone()));

        tracing::info!("loglens agent running");
        shutdown.await;

        cancel.cancel();
        if let Err(e) = reconcile_task.await {
            tracing::warn!(error = %e, "reconciliation loop ended abnormally");
        }
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stops every live monitor task.
    async fn shutdown(&self) {
        let stopped = self.reconciler.registry().stop_all().await;
        tracing::info!(
            services = stopped,
            uptime_secs = self.start_time.elapsed().as_secs(),
            "all services stopped"
        );
    }

    fn pid_file(&self) -> Option<PathBuf> {
        let path = self.config.general.pid_file.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LoglensConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<TemplateCatalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        self.reconciler.registry()
    }
}

/// Builds the inference backend named by `[inference].backend`.
pub fn build_backend(config: &InferenceConfig) -> Result<Arc<dyn InferenceBackend>> {
    match config.backend.as_str() {
        "llama_server" => {
            let backend = LlamaServerBackend::new(
                &config.endpoint,
                Duration::from_secs(config.request_timeout_secs),
            )
            .map_err(|e| anyhow::anyhow!("failed to build inference client: {}", e))?;
            Ok(Arc::new(backend))
        }
        "disabled" => {
            tracing::warn!("inference disabled, transform-mode services will emit LLMERROR");
            Ok(Arc::new(DisabledBackend))
        }
        other => Err(anyhow::anyhow!(
            "unknown inference backend '{}', expected 'llama_server' or 'disabled'",
            other
        )),
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl-C handler: {}", e))?;
    Ok("CTRL_C")
}

/// Write the current process PID to a file.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create the file
/// - Verifies the created file is a regular file
/// - Creates the parent directory with mode 0o700
///
/// # Errors
///
/// Fails when the file already exists (another instance is running) or
/// cannot be written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file; failures are logged, never returned.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}
