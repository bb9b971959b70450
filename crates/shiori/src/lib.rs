//! A durable execution engine for Rust.
//!
//! Workflows are ordinary async functions that wrap their side effects in
//! named steps. Each successful step is appended to a journal; running the
//! same execution again replays recorded steps instead of repeating them.
//!
//! # Example
//!
//! ```rust
//! use shiori::prelude::*;
//! use shiori::journal::MemoryJournal;
//!
//! # tokio_test::block_on(async {
//! let engine = Engine::builder()
//!     .journal(MemoryJournal::new())
//!     .define_fn("onboarding", |ctx: DurableContext, input| async move {
//!         let email = input.as_str().unwrap_or_default().to_string();
//!         let user_id: Option<u64> = ctx
//!             .step("create_user", || async { Ok::<_, std::io::Error>(42u64) })
//!             .await
//!             .result()?;
//!         ctx.step("send_welcome", || {
//!             let email = email.clone();
//!             async move { Ok::<_, std::io::Error>(format!("welcome {email} ({user_id:?})")) }
//!         })
//!         .await
//!         .check()
//!     })
//!     .build()
//!     .unwrap();
//!
//! let input = serde_json::json!("user@example.com");
//! engine
//!     .execute(ExecutionScope::new("user-1"), "onboarding", input.clone())
//!     .await
//!     .unwrap();
//!
//! // Second attempt replays both steps from the journal.
//! engine
//!     .execute(ExecutionScope::new("user-1"), "onboarding", input)
//!     .await
//!     .unwrap();
//! # });
//! ```

pub mod journal;

mod context;
mod engine;
mod history;
mod registry;

// Re-export core types
pub use shiori_core::*;

pub use context::{DurableContext, ExecutionScope};
pub use engine::{Engine, EngineBuilder, EngineConfig};
pub use history::{DuplicateStepPolicy, HistoryIndex};
pub use registry::{FnWorkflow, Workflow, WorkflowRegistry};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        DurableContext, Engine, EngineBuilder, ExecutionId, ExecutionScope, Journal, RetryPolicy,
        StepName, StepOptions, StepResult, Workflow, WorkflowError,
    };
}
