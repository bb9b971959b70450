//! Replay engine: drives one execution attempt at a time.

use crate::context::{DurableContext, ExecutionScope};
use crate::history::{DuplicateStepPolicy, HistoryIndex};
use crate::registry::{Workflow, WorkflowRegistry};
use serde_json::Value;
use shiori_core::{ExecutionId, Journal, NewRecord, Record, WorkflowError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Engine behavior switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Write `WorkflowStarted`, `StepStarted`, `WorkflowCompleted` and
    /// `WorkflowFailed` records in addition to `StepCompleted`.
    /// Default: off.
    pub record_lifecycle: bool,
    /// How duplicate completions in history are treated.
    /// Default: [`DuplicateStepPolicy::Reject`].
    pub duplicate_steps: DuplicateStepPolicy,
}

/// Replays workflows against a journal.
///
/// Every [`execute`](Engine::execute) call reads the journal, rebuilds the
/// history of the given execution and runs the workflow from the top. Steps
/// found in history return their recorded result without running again.
pub struct Engine {
    journal: Arc<dyn Journal>,
    registry: Arc<WorkflowRegistry>,
    config: EngineConfig,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new(journal: Arc<dyn Journal>, registry: WorkflowRegistry) -> Self {
        Self {
            journal,
            registry: Arc::new(registry),
            config: EngineConfig::default(),
        }
    }

    /// Creates a new engine builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The registered workflows.
    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// The journal backing this engine.
    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one execution attempt of workflow `name`.
    ///
    /// Returns the workflow's own result. Journal read failures, unknown
    /// workflow names and duplicate history entries fail the attempt before
    /// the workflow runs.
    pub async fn execute(
        &self,
        scope: ExecutionScope,
        name: &str,
        input: Value,
    ) -> Result<(), WorkflowError> {
        let workflow = self
            .registry
            .get(name)
            .ok_or_else(|| WorkflowError::WorkflowNotFound(name.to_string()))?;

        let records = self.journal.read().await?;
        let history =
            HistoryIndex::build(&records, scope.execution_id(), self.config.duplicate_steps)?;

        {
            let interrupted = history.interrupted_steps();
            if !interrupted.is_empty() {
                warn!(
                    "Execution {} has steps that started but never completed: {:?}",
                    scope.execution_id(),
                    interrupted
                );
            }
        }

        info!(
            "Executing workflow '{}' ({}) with {} completed steps in history",
            name,
            scope.execution_id(),
            history.len()
        );

        let execution_id = scope.execution_id().clone();
        let already_started = history.workflow_started();
        let already_completed = history.workflow_completed();

        if self.config.record_lifecycle && !already_started {
            self.journal
                .append(NewRecord::workflow_started(execution_id.clone(), name))
                .await?;
        }

        let ctx = DurableContext::new(
            scope,
            name,
            Arc::clone(&self.journal),
            history,
            self.config.record_lifecycle,
        );
        let result = workflow.run(ctx, input).await;

        match &result {
            Ok(()) => info!("Workflow '{}' ({}) completed", name, execution_id),
            Err(e) => warn!("Workflow '{}' ({}) failed: {}", name, execution_id, e),
        }

        if self.config.record_lifecycle {
            self.record_outcome(&execution_id, name, &result, already_completed)
                .await?;
        }

        result
    }

    async fn record_outcome(
        &self,
        execution_id: &ExecutionId,
        name: &str,
        result: &Result<(), WorkflowError>,
        already_completed: bool,
    ) -> Result<(), WorkflowError> {
        match result {
            Ok(()) if already_completed => Ok(()),
            Ok(()) => {
                self.journal
                    .append(NewRecord::workflow_completed(execution_id.clone(), name))
                    .await?;
                Ok(())
            }
            Err(e) => {
                let record =
                    NewRecord::workflow_failed(execution_id.clone(), name, e.to_string());
                if let Err(append) = self.journal.append(record).await {
                    warn!(
                        "Failed to record failure of workflow '{}' ({}): {}",
                        name, execution_id, append
                    );
                }
                Ok(())
            }
        }
    }

    /// Records of one execution, in sequence order.
    pub async fn history(&self, execution_id: &ExecutionId) -> Result<Vec<Record>, WorkflowError> {
        Ok(self.journal.read_execution(execution_id).await?)
    }

    /// Closes the journal.
    pub async fn close(&self) -> Result<(), WorkflowError> {
        Ok(self.journal.close().await?)
    }
}

/// Builder for constructing [`Engine`] instances.
#[derive(Default)]
pub struct EngineBuilder {
    journal: Option<Arc<dyn Journal>>,
    registry: WorkflowRegistry,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Creates a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the journal.
    pub fn journal<J: Journal + 'static>(mut self, journal: J) -> Self {
        self.journal = Some(Arc::new(journal));
        self
    }

    /// Sets a journal that is shared with other owners.
    pub fn shared_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Replaces the registry.
    pub fn registry(mut self, registry: WorkflowRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registers a workflow.
    pub fn define<W: Workflow + 'static>(mut self, name: impl Into<String>, workflow: W) -> Self {
        self.registry.define(name, workflow);
        self
    }

    /// Registers an async closure as a workflow.
    pub fn define_fn<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(DurableContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkflowError>> + Send + 'static,
    {
        self.registry.define_fn(name, f);
        self
    }

    /// Enables or disables lifecycle records.
    pub fn record_lifecycle(mut self, enabled: bool) -> Self {
        self.config.record_lifecycle = enabled;
        self
    }

    /// Sets the duplicate step policy.
    pub fn duplicate_steps(mut self, policy: DuplicateStepPolicy) -> Self {
        self.config.duplicate_steps = policy;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the engine.
    pub fn build(self) -> Result<Engine, WorkflowError> {
        let journal = self.journal.ok_or_else(|| {
            WorkflowError::Configuration("Journal must be specified".to_string())
        })?;

        Ok(Engine {
            journal,
            registry: Arc::new(self.registry),
            config: self.config,
        })
    }
}
