//! Pipeline orchestration: resolve order → validate settings → index → enrich → render.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use workspacebuilder_shared::{ComponentId, Result, Role, SettingsSource, WorkspaceBuilderError};
use workspacebuilder_storage::GraphStore;

use crate::component::ComponentRegistry;
use crate::context::{Context, ResolvedSettings};
use crate::order::resolve_order;
use crate::outputter::Outputter;

/// What happens when an enricher or renderer fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the run on the first failure.
    #[default]
    FailFast,
    /// Record the failure, skip everything downstream of it, keep going.
    /// Indexer failures still abort the run.
    ContinueOnError,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub failure_policy: FailurePolicy,
}

/// A component failure recorded under [`FailurePolicy::ContinueOnError`].
#[derive(Debug, Clone)]
pub struct ComponentFailure {
    pub component: ComponentId,
    pub error: String,
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Components that completed, in execution order.
    pub executed: Vec<ComponentId>,
    pub failed: Vec<ComponentFailure>,
    /// Components not run because something upstream failed.
    pub skipped: Vec<ComponentId>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// How a component's turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a phase starts.
    fn phase(&self, role: Role);
    fn component_started(&self, id: &ComponentId);
    fn component_finished(&self, id: &ComponentId, outcome: ComponentOutcome);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _role: Role) {}
    fn component_started(&self, _id: &ComponentId) {}
    fn component_finished(&self, _id: &ComponentId, _outcome: ComponentOutcome) {}
    fn done(&self, _report: &RunReport) {}
}

/// Runs registered components against one graph store and outputter.
pub struct Pipeline<'a> {
    registry: &'a ComponentRegistry,
    settings: &'a SettingsSource,
    graph: Arc<GraphStore>,
    outputter: Arc<dyn Outputter>,
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        registry: &'a ComponentRegistry,
        settings: &'a SettingsSource,
        graph: Arc<GraphStore>,
        outputter: Arc<dyn Outputter>,
    ) -> Self {
        Self {
            registry,
            settings,
            graph,
            outputter,
            options: PipelineOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an externally owned cancellation token (e.g. wired to Ctrl-C).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the requested components (all when empty) and their dependencies.
    ///
    /// 1. Resolve the closure and execution order
    /// 2. Resolve and check every setting the selected components declare
    /// 3. Run indexers, then enrichers, then renderers
    #[instrument(skip_all, fields(requested = requested.len(), policy = ?self.options.failure_policy))]
    pub async fn run(
        &self,
        requested: &[ComponentId],
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let started_at = Utc::now();

        // --- Planning: nothing runs if any of this fails ---
        self.registry.validate()?;
        let order = resolve_order(self.registry, requested)?;
        let settings = ResolvedSettings::resolve(self.registry, &order, self.settings)?;

        let ctx = Context::new(
            Arc::new(settings),
            self.graph.clone(),
            self.outputter.clone(),
            self.cancel.clone(),
        );
        info!(run_id = %ctx.run_id(), components = order.len(), "starting pipeline run");

        let mut report = RunReport {
            run_id: ctx.run_id(),
            started_at,
            executed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            elapsed: Duration::ZERO,
        };
        let mut blocked: HashSet<ComponentId> = HashSet::new();

        // --- Phases ---
        for role in Role::ALL {
            let members: Vec<&ComponentId> = order.iter().filter(|id| id.role == role).collect();
            if members.is_empty() {
                continue;
            }
            progress.phase(role);
            info!(phase = role.phase_name(), components = members.len(), "entering phase");

            for id in members {
                if ctx.is_cancelled() {
                    warn!(run_id = %ctx.run_id(), next = %id, "run cancelled");
                    return Err(WorkspaceBuilderError::Cancelled);
                }

                let Some(component) = self.registry.get(id) else {
                    return Err(WorkspaceBuilderError::ComponentNotFound { id: id.clone() });
                };

                if let Some(upstream) = component
                    .dependencies()
                    .iter()
                    .map(|d| d.id())
                    .find(|dep| blocked.contains(dep))
                {
                    warn!(component = %id, upstream = %upstream, "skipping component, upstream failed");
                    blocked.insert(id.clone());
                    report.skipped.push(id.clone());
                    progress.component_finished(id, ComponentOutcome::Skipped);
                    continue;
                }

                progress.component_started(id);
                let component_start = Instant::now();
                match component.execute(&ctx).await {
                    Ok(()) => {
                        debug!(
                            component = %id,
                            elapsed_ms = component_start.elapsed().as_millis(),
                            "component finished"
                        );
                        report.executed.push(id.clone());
                        progress.component_finished(id, ComponentOutcome::Succeeded);
                    }
                    Err(WorkspaceBuilderError::Cancelled) => {
                        warn!(component = %id, "component observed cancellation");
                        return Err(WorkspaceBuilderError::Cancelled);
                    }
                    Err(e) => {
                        error!(component = %id, phase = role.phase_name(), error = %e, "component failed");
                        progress.component_finished(id, ComponentOutcome::Failed);

                        let fatal = self.options.failure_policy == FailurePolicy::FailFast
                            || role == Role::Indexer;
                        if fatal {
                            return Err(WorkspaceBuilderError::component_execution(id.clone(), e));
                        }
                        blocked.insert(id.clone());
                        report.failed.push(ComponentFailure {
                            component: id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        report.elapsed = start.elapsed();
        progress.done(&report);

        info!(
            run_id = %report.run_id,
            executed = report.executed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "pipeline run complete"
        );

        Ok(report)
    }
}
