//! The durable execution context handed to workflow functions.

use crate::history::HistoryIndex;
use serde::Serialize;
use shiori_core::codec::encode_payload;
use shiori_core::{
    BoxError, ExecutionId, Journal, NewRecord, StepName, StepOptions, StepResult, WorkflowError,
};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identity, cancellation and deadline of one execution attempt.
///
/// Cancellation and the deadline are advisory: the engine passes them to the
/// workflow and never aborts a running step because of them.
///
/// # Examples
///
/// ```
/// use shiori::ExecutionScope;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// # tokio_test::block_on(async {
/// let scope = ExecutionScope::new("order-42")
///     .with_cancellation(token.clone())
///     .with_timeout(Duration::from_secs(30));
/// assert_eq!(scope.execution_id().as_str(), "order-42");
/// assert!(scope.deadline().is_some());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionScope {
    execution_id: ExecutionId,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecutionScope {
    /// A scope for `execution_id` with a fresh token and no deadline.
    pub fn new(execution_id: impl Into<ExecutionId>) -> Self {
        Self {
            execution_id: execution_id.into(),
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Uses `token` for cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Sets an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline `timeout` from now.
    ///
    /// A timeout too large to represent leaves the scope without a deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// The execution this scope belongs to.
    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    /// The cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Context a workflow uses to run durable steps.
///
/// Cloning is cheap; clones share the same history and journal. A context
/// lives for one execution attempt.
#[derive(Clone)]
pub struct DurableContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    scope: ExecutionScope,
    workflow_name: String,
    journal: Arc<dyn Journal>,
    history: HistoryIndex,
    record_step_starts: bool,
    completed: Mutex<HashSet<StepName>>,
}

impl fmt::Debug for DurableContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableContext")
            .field("execution_id", &self.inner.scope.execution_id)
            .field("workflow_name", &self.inner.workflow_name)
            .field("history_len", &self.inner.history.len())
            .finish()
    }
}

impl DurableContext {
    pub(crate) fn new(
        scope: ExecutionScope,
        workflow_name: impl Into<String>,
        journal: Arc<dyn Journal>,
        history: HistoryIndex,
        record_step_starts: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                scope,
                workflow_name: workflow_name.into(),
                journal,
                history,
                record_step_starts,
                completed: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// The execution being driven.
    pub fn execution_id(&self) -> &ExecutionId {
        &self.inner.scope.execution_id
    }

    /// The registered workflow name.
    pub fn workflow_name(&self) -> &str {
        &self.inner.workflow_name
    }

    /// History loaded at the start of this attempt.
    pub fn history(&self) -> &HistoryIndex {
        &self.inner.history
    }

    /// The attempt's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.scope.cancellation
    }

    /// Returns `true` once the caller has requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.inner.scope.cancellation.is_cancelled()
    }

    /// Resolves when the caller requests cancellation.
    pub async fn cancelled(&self) {
        self.inner.scope.cancellation.cancelled().await;
    }

    /// The attempt's deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.scope.deadline
    }

    /// Time left before the deadline. `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .scope
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Runs `thunk` durably under `name` with default options.
    ///
    /// See [`step_with`](Self::step_with).
    pub async fn step<T, E, F, Fut>(&self, name: impl Into<StepName>, thunk: F) -> StepResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize,
        E: Into<BoxError>,
    {
        self.step_with(name, StepOptions::default(), thunk).await
    }

    /// Runs `thunk` durably under `name`.
    ///
    /// If `name` completed in an earlier attempt, its recorded payload is
    /// returned and `thunk` is not called. Otherwise `thunk` runs (retried
    /// according to `options`), and a successful value is encoded and
    /// appended as a `StepCompleted` record before this returns. A failed step
    /// appends nothing and will run again on the next attempt.
    ///
    /// # Examples
    ///
    /// ```
    /// use shiori::prelude::*;
    /// use shiori::journal::MemoryJournal;
    ///
    /// # tokio_test::block_on(async {
    /// let engine = Engine::builder()
    ///     .journal(MemoryJournal::new())
    ///     .define_fn("greet", |ctx: DurableContext, _input| async move {
    ///         let greeting: Option<String> = ctx
    ///             .step_with("compose", StepOptions::new().retry(RetryPolicy::immediate(2)), || async {
    ///                 Ok::<_, std::io::Error>("hello".to_string())
    ///             })
    ///             .await
    ///             .result()?;
    ///         assert_eq!(greeting.as_deref(), Some("hello"));
    ///         Ok::<(), WorkflowError>(())
    ///     })
    ///     .build()
    ///     .unwrap();
    ///
    /// engine
    ///     .execute(ExecutionScope::new("g-1"), "greet", serde_json::Value::Null)
    ///     .await
    ///     .unwrap();
    /// # });
    /// ```
    pub async fn step_with<T, E, F, Fut>(
        &self,
        name: impl Into<StepName>,
        options: StepOptions,
        mut thunk: F,
    ) -> StepResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize,
        E: Into<BoxError>,
    {
        let name = name.into();
        if name.is_empty() {
            return StepResult::failed(
                name.clone(),
                WorkflowError::InvalidStepName(name.to_string()),
            );
        }

        if self.inner.completed.lock().await.contains(&name) {
            warn!(
                "Step '{}' already completed in execution {}",
                name,
                self.execution_id()
            );
            return StepResult::failed(
                name.clone(),
                WorkflowError::DuplicateStep {
                    execution_id: self.execution_id().clone(),
                    step_name: name,
                },
            );
        }

        if let Some(record) = self.inner.history.get(name.as_str()) {
            debug!("Replaying step '{}' from record {}", name, record.sequence);
            self.inner.completed.lock().await.insert(name.clone());
            return StepResult::replayed(name, record.payload.clone());
        }

        if self.inner.record_step_starts {
            let started = NewRecord::step_started(
                self.execution_id().clone(),
                self.workflow_name(),
                name.clone(),
            );
            if let Err(e) = self.inner.journal.append(started).await {
                return StepResult::failed(name, e.into());
            }
        }

        let encoded = match self.run_thunk(&name, &options, &mut thunk).await {
            Ok(value) => encode_payload(&value),
            Err(e) => return StepResult::failed(name, e),
        };

        let payload = match encoded {
            Ok(payload) => payload,
            Err(source) => {
                warn!("Step '{}' returned a value that cannot be encoded", name);
                return StepResult::failed(
                    name.clone(),
                    WorkflowError::Encode {
                        step_name: name,
                        source,
                    },
                );
            }
        };

        let record = NewRecord::step_completed(
            self.execution_id().clone(),
            self.workflow_name(),
            name.clone(),
            payload.clone(),
        );
        match self.inner.journal.append(record).await {
            Ok(sequence) => {
                info!("Step '{}' completed (record {})", name, sequence);
                self.inner.completed.lock().await.insert(name.clone());
                StepResult::completed(name, payload)
            }
            Err(e) => {
                warn!("Step '{}' completed but could not be recorded: {}", name, e);
                StepResult::failed(name, e.into())
            }
        }
    }

    async fn run_thunk<T, E, F, Fut>(
        &self,
        name: &StepName,
        options: &StepOptions,
        thunk: &mut F,
    ) -> Result<T, WorkflowError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let policy = &options.retry_policy;
        let max_retries = policy.max_retries();
        let mut attempt = 0;

        loop {
            let outcome = match options.timeout {
                Some(limit) => match timeout(limit, thunk()).await {
                    Ok(result) => result.map_err(|e| WorkflowError::step(name, e)),
                    Err(_) => Err(WorkflowError::Timeout {
                        step_name: name.clone(),
                    }),
                },
                None => thunk().await.map_err(|e| WorkflowError::step(name, e)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_retries => {
                    info!(
                        "Step '{}' failed: {}, retrying ({}/{})",
                        name,
                        e,
                        attempt + 1,
                        max_retries
                    );
                    if let Some(delay) = policy.delay_for_attempt(attempt) {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Step '{}' failed after {} retries: {}", name, attempt, e);
                    return Err(e);
                }
            }
        }
    }
}
