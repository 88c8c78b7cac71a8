//! Pipeline registry and lifecycle mediation.
//!
//! The [`Engine`] owns pipelines by name. Lifecycle commands mutate the
//! registry under a mutex, so operations are mutually exclusive; the
//! data path inside each pipeline is unaffected by registry locking.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;

use logflow_core::config::PipelineConfig;
use logflow_core::metrics as metric_names;
use logflow_core::plugin::PluginRegistry;
use logflow_pipeline::{MetricsSnapshot, Pipeline, PipelineState, builtin_registry};

use crate::error::EngineError;

/// Named collection of pipelines with lifecycle and metrics operations.
///
/// The engine is an explicit value: construct one at startup and inject
/// it into the control plane. There is no process-wide singleton, so
/// tests can run isolated engines side by side.
///
/// # Example
/// ```ignore
/// let engine = Engine::with_builtins();
/// let name = engine.load_pipeline(config, false).await?;
/// engine.start_pipeline(&name).await?;
/// // ...
/// engine.shutdown(Duration::from_secs(30)).await;
/// ```
pub struct Engine {
    pipelines: Mutex<HashMap<String, Pipeline>>,
    registry: Arc<PluginRegistry>,
}

impl Engine {
    /// Create an engine that resolves plugins from the given registry.
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            pipelines: Mutex::new(HashMap::new()),
            registry,
        }
    }

    /// Create an engine with all built-in plugins registered.
    pub fn with_builtins() -> Self {
        Self::new(Arc::new(builtin_registry()))
    }

    /// Shared handle to the plugin registry backing this engine.
    pub fn registry(&self) -> Arc<PluginRegistry> {
        Arc::clone(&self.registry)
    }

    /// Validate a config, construct the pipeline, and insert it.
    ///
    /// Returns the pipeline name. A name collision fails unless
    /// `replace` is set, in which case the existing pipeline is stopped
    /// and evicted first. Config problems (unknown plugin type, invalid
    /// plugin settings) fail here, before anything starts.
    pub async fn load_pipeline(
        &self,
        config: PipelineConfig,
        replace: bool,
    ) -> Result<String, EngineError> {
        let name = config.name.clone();
        let mut pipelines = self.pipelines.lock().await;

        if pipelines.contains_key(&name) {
            if !replace {
                return Err(EngineError::AlreadyExists { name });
            }
            tracing::warn!(pipeline = %name, "replacing existing pipeline");
            if let Some(mut old) = pipelines.remove(&name) {
                if let Err(e) = old.stop().await {
                    tracing::warn!(pipeline = %name, error = %e, "failed to stop replaced pipeline");
                }
            }
        }

        let pipeline = Pipeline::new(config, Arc::clone(&self.registry))?;
        pipelines.insert(name.clone(), pipeline);

        tracing::info!(pipeline = %name, total = pipelines.len(), "pipeline loaded");
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(metric_names::ENGINE_PIPELINES).set(pipelines.len() as f64);
        Ok(name)
    }

    /// Start a loaded pipeline. Idempotent if it is already running.
    pub async fn start_pipeline(&self, name: &str) -> Result<(), EngineError> {
        let mut pipelines = self.pipelines.lock().await;
        let pipeline = pipelines.get_mut(name).ok_or_else(|| EngineError::NotFound {
            name: name.to_owned(),
        })?;
        pipeline.start().await?;
        update_running_gauge(&pipelines);
        Ok(())
    }

    /// Stop a pipeline. Idempotent if it is already stopped.
    pub async fn stop_pipeline(&self, name: &str) -> Result<(), EngineError> {
        let mut pipelines = self.pipelines.lock().await;
        let pipeline = pipelines.get_mut(name).ok_or_else(|| EngineError::NotFound {
            name: name.to_owned(),
        })?;
        pipeline.stop().await?;
        update_running_gauge(&pipelines);
        Ok(())
    }

    /// Stop and start a pipeline. Counters reset; plugins are rebuilt
    /// from config; no event survives the restart.
    pub async fn restart_pipeline(&self, name: &str) -> Result<(), EngineError> {
        let mut pipelines = self.pipelines.lock().await;
        let pipeline = pipelines.get_mut(name).ok_or_else(|| EngineError::NotFound {
            name: name.to_owned(),
        })?;
        pipeline.restart().await?;
        update_running_gauge(&pipelines);
        Ok(())
    }

    /// Stop (if running) and evict a pipeline.
    pub async fn remove_pipeline(&self, name: &str) -> Result<(), EngineError> {
        let mut pipelines = self.pipelines.lock().await;
        let mut pipeline = pipelines.remove(name).ok_or_else(|| EngineError::NotFound {
            name: name.to_owned(),
        })?;
        if let Err(e) = pipeline.stop().await {
            tracing::warn!(pipeline = %name, error = %e, "pipeline stop failed during removal");
        }
        tracing::info!(pipeline = %name, total = pipelines.len(), "pipeline removed");
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(metric_names::ENGINE_PIPELINES).set(pipelines.len() as f64);
        Ok(())
    }

    /// Names of all loaded pipelines, sorted for stable output.
    pub async fn list_pipelines(&self) -> Vec<String> {
        let pipelines = self.pipelines.lock().await;
        let mut names: Vec<String> = pipelines.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metrics snapshot of one pipeline.
    pub async fn pipeline_metrics(&self, name: &str) -> Result<MetricsSnapshot, EngineError> {
        let pipelines = self.pipelines.lock().await;
        let pipeline = pipelines.get(name).ok_or_else(|| EngineError::NotFound {
            name: name.to_owned(),
        })?;
        Ok(pipeline.snapshot())
    }

    /// Metrics snapshots of every loaded pipeline, keyed by name.
    pub async fn metrics_snapshot(&self) -> BTreeMap<String, MetricsSnapshot> {
        let pipelines = self.pipelines.lock().await;
        pipelines
            .iter()
            .map(|(name, pipeline)| (name.clone(), pipeline.snapshot()))
            .collect()
    }

    /// Stop every pipeline in parallel and evict them all.
    ///
    /// Each pipeline gets at most `deadline` to stop cleanly; a
    /// pipeline that exceeds it is abandoned with an error log. The
    /// engine is empty afterwards.
    pub async fn shutdown(&self, deadline: Duration) {
        let drained: Vec<(String, Pipeline)> = {
            let mut pipelines = self.pipelines.lock().await;
            pipelines.drain().collect()
        };

        if drained.is_empty() {
            return;
        }
        tracing::info!(pipelines = drained.len(), "engine shutting down");

        let mut stops = JoinSet::new();
        for (name, mut pipeline) in drained {
            stops.spawn(async move {
                match tokio::time::timeout(deadline, pipeline.stop()).await {
                    Ok(Ok(())) => {
                        tracing::info!(pipeline = %name, "pipeline stopped");
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(pipeline = %name, error = %e, "pipeline stop failed");
                    }
                    Err(_) => {
                        tracing::error!(
                            pipeline = %name,
                            "shutdown deadline exceeded, releasing pipeline"
                        );
                    }
                }
            });
        }
        while stops.join_next().await.is_some() {}

        metrics::gauge!(metric_names::ENGINE_PIPELINES).set(0.0);
        metrics::gauge!(metric_names::ENGINE_PIPELINES_RUNNING).set(0.0);
        tracing::info!("engine shutdown complete");
    }
}

fn update_running_gauge(pipelines: &HashMap<String, Pipeline>) {
    let running = pipelines
        .values()
        .filter(|p| p.state() == PipelineState::Running)
        .count();
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(metric_names::ENGINE_PIPELINES_RUNNING).set(running as f64);
}
