//! Workflow definitions and the registry that resolves them by name.

use crate::context::DurableContext;
use async_trait::async_trait;
use serde_json::Value;
use shiori_core::WorkflowError;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// A durable workflow function.
///
/// `run` is called once per execution attempt. It must issue the same step
/// calls in the same order on every attempt for replay to be sound.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use shiori::prelude::*;
/// use serde_json::Value;
///
/// struct SendReceipt;
///
/// #[async_trait]
/// impl Workflow for SendReceipt {
///     async fn run(&self, ctx: DurableContext, input: Value) -> Result<(), WorkflowError> {
///         let email = input.as_str().unwrap_or_default();
///         ctx.step("send", move || async move {
///             Ok::<_, std::io::Error>(format!("sent to {email}"))
///         })
///         .await
///         .check()
///     }
/// }
/// ```
#[async_trait]
pub trait Workflow: Send + Sync {
    /// Runs the workflow body against `ctx`.
    async fn run(&self, ctx: DurableContext, input: Value) -> Result<(), WorkflowError>;
}

/// Adapts an async closure into a [`Workflow`].
pub struct FnWorkflow<F>(F);

impl<F> FnWorkflow<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> fmt::Debug for FnWorkflow<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWorkflow").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Workflow for FnWorkflow<F>
where
    F: Fn(DurableContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WorkflowError>> + Send,
{
    async fn run(&self, ctx: DurableContext, input: Value) -> Result<(), WorkflowError> {
        (self.0)(ctx, input).await
    }
}

/// Name-to-workflow map owned by an engine.
///
/// Populated before the engine is built; not mutated while executing.
#[derive(Default, Clone)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Arc<dyn Workflow>>,
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &self.workflows.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl WorkflowRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `workflow` under `name`.
    ///
    /// An existing definition with the same name is replaced and returned.
    pub fn define<W: Workflow + 'static>(
        &mut self,
        name: impl Into<String>,
        workflow: W,
    ) -> Option<Arc<dyn Workflow>> {
        let name = name.into();
        let previous = self.workflows.insert(name.clone(), Arc::new(workflow));
        if previous.is_some() {
            debug!("Workflow '{}' redefined", name);
        }
        previous
    }

    /// Registers an async closure under `name`.
    pub fn define_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> Option<Arc<dyn Workflow>>
    where
        F: Fn(DurableContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkflowError>> + Send + 'static,
    {
        self.define(name, FnWorkflow::new(f))
    }

    /// Resolves `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Workflow>> {
        self.workflows.get(name).cloned()
    }

    /// Returns `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    /// Number of registered workflows.
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
