use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shiori::journal::{FileJournal, MemoryJournal};
use shiori::prelude::*;
use shiori::{JournalError, NewRecord, Record, RecordKind};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

#[derive(Debug, Default)]
struct Counters {
    a: AtomicU32,
    b: AtomicU32,
    fail_b: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Account {
    id: u64,
    email: String,
}

/// Step A creates an account, step B sends a welcome mail for it.
struct Onboarding {
    counters: Arc<Counters>,
}

#[async_trait]
impl Workflow for Onboarding {
    async fn run(&self, ctx: DurableContext, input: Value) -> Result<(), WorkflowError> {
        let counters = &self.counters;
        let email = input.as_str().unwrap_or_default().to_string();

        let account: Option<Account> = ctx
            .step("A", move || {
                let email = email.clone();
                async move {
                    counters.a.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>(Account { id: 7, email })
                }
            })
            .await
            .result()?;
        let account = account.ok_or_else(|| WorkflowError::Failed("no account".to_string()))?;
        let account = &account;

        ctx.step("B", move || async move {
            counters.b.fetch_add(1, Ordering::SeqCst);
            if counters.fail_b.load(Ordering::SeqCst) {
                return Err(std::io::Error::other("mail server unavailable"));
            }
            Ok(format!("welcome {}", account.email))
        })
        .await
        .check()
    }
}

fn onboarding_engine(journal: Arc<dyn Journal>, counters: &Arc<Counters>) -> Engine {
    Engine::builder()
        .shared_journal(journal)
        .define(
            "onboarding",
            Onboarding {
                counters: Arc::clone(counters),
            },
        )
        .build()
        .unwrap()
}

fn step_names(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .filter_map(|r| r.step_name.as_ref().map(|s| s.as_str()))
        .collect()
}

#[tokio::test]
async fn test_second_run_replays_everything() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let counters = Arc::new(Counters::default());
    let engine = onboarding_engine(Arc::clone(&journal), &counters);
    let input = serde_json::json!("user@example.com");

    assert_ok!(
        engine
            .execute(ExecutionScope::new("user-1"), "onboarding", input.clone())
            .await
    );
    assert_eq!(counters.a.load(Ordering::SeqCst), 1);
    assert_eq!(counters.b.load(Ordering::SeqCst), 1);

    let records = journal.read().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(step_names(&records), vec!["A", "B"]);
    assert!(records.iter().all(|r| r.kind == RecordKind::StepCompleted));

    assert_ok!(
        engine
            .execute(ExecutionScope::new("user-1"), "onboarding", input)
            .await
    );
    assert_eq!(counters.a.load(Ordering::SeqCst), 1);
    assert_eq!(counters.b.load(Ordering::SeqCst), 1);
    assert_eq!(journal.read().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_step_resumes_without_repeating_earlier_steps() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let counters = Arc::new(Counters::default());
    counters.fail_b.store(true, Ordering::SeqCst);
    let engine = onboarding_engine(Arc::clone(&journal), &counters);
    let input = serde_json::json!("user@example.com");

    let result = engine
        .execute(ExecutionScope::new("user-1"), "onboarding", input.clone())
        .await;
    match assert_err!(result) {
        WorkflowError::StepError { step_name, .. } => assert_eq!(step_name, "B"),
        other => panic!("Unexpected error: {other:?}"),
    }
    assert_eq!(step_names(&journal.read().await.unwrap()), vec!["A"]);

    counters.fail_b.store(false, Ordering::SeqCst);
    assert_ok!(
        engine
            .execute(ExecutionScope::new("user-1"), "onboarding", input)
            .await
    );
    assert_eq!(counters.a.load(Ordering::SeqCst), 1);
    assert_eq!(counters.b.load(Ordering::SeqCst), 2);
    assert_eq!(step_names(&journal.read().await.unwrap()), vec!["A", "B"]);
}

#[tokio::test]
async fn test_executions_are_isolated() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let counters = Arc::new(Counters::default());
    let engine = onboarding_engine(Arc::clone(&journal), &counters);

    for id in ["user-1", "user-2"] {
        assert_ok!(
            engine
                .execute(ExecutionScope::new(id), "onboarding", Value::Null)
                .await
        );
    }
    assert_eq!(counters.a.load(Ordering::SeqCst), 2);
    assert_eq!(counters.b.load(Ordering::SeqCst), 2);

    let first = engine.history(&ExecutionId::new("user-1")).await.unwrap();
    let second = engine.history(&ExecutionId::new("user-2")).await.unwrap();
    assert_eq!(step_names(&first), vec!["A", "B"]);
    assert_eq!(step_names(&second), vec!["A", "B"]);
}

#[tokio::test]
async fn test_replayed_value_matches_original() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let seen = Arc::new(std::sync::Mutex::new(Vec::<Account>::new()));
    let sink = Arc::clone(&seen);

    let engine = Engine::builder()
        .shared_journal(Arc::clone(&journal))
        .define_fn("lookup", move |ctx: DurableContext, _input: Value| {
            let sink = Arc::clone(&sink);
            async move {
                let account: Option<Account> = ctx
                    .step("fetch", || async {
                        Ok::<_, std::io::Error>(Account {
                            id: 99,
                            email: "a@b.c".to_string(),
                        })
                    })
                    .await
                    .result()?;
                if let Some(account) = account {
                    sink.lock().unwrap().push(account);
                }
                Ok(())
            }
        })
        .build()
        .unwrap();

    for _ in 0..2 {
        assert_ok!(
            engine
                .execute(ExecutionScope::new("x"), "lookup", Value::Null)
                .await
        );
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
    assert_eq!(seen[0].id, 99);
}

#[tokio::test]
async fn test_unit_results_store_no_payload() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let engine = Engine::builder()
        .shared_journal(Arc::clone(&journal))
        .define_fn("notify", |ctx: DurableContext, _input: Value| async move {
            ctx.step("ping", || async { Ok::<_, std::io::Error>(()) })
                .await
                .check()
        })
        .build()
        .unwrap();

    assert_ok!(
        engine
            .execute(ExecutionScope::new("n"), "notify", Value::Null)
            .await
    );
    let records = journal.read().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].payload.is_none());
}

#[tokio::test]
async fn test_unknown_workflow_touches_nothing() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let engine = Engine::builder()
        .shared_journal(Arc::clone(&journal))
        .record_lifecycle(true)
        .build()
        .unwrap();

    let result = engine
        .execute(ExecutionScope::new("e"), "nope", Value::Null)
        .await;
    assert!(matches!(
        assert_err!(result),
        WorkflowError::WorkflowNotFound(_)
    ));
    assert!(journal.read().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lifecycle_records_across_failure_and_resume() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let counters = Arc::new(Counters::default());
    counters.fail_b.store(true, Ordering::SeqCst);
    let engine = Engine::builder()
        .shared_journal(Arc::clone(&journal))
        .record_lifecycle(true)
        .define(
            "onboarding",
            Onboarding {
                counters: Arc::clone(&counters),
            },
        )
        .build()
        .unwrap();

    assert_err!(
        engine
            .execute(ExecutionScope::new("e"), "onboarding", Value::Null)
            .await
    );
    counters.fail_b.store(false, Ordering::SeqCst);
    assert_ok!(
        engine
            .execute(ExecutionScope::new("e"), "onboarding", Value::Null)
            .await
    );

    let kinds: Vec<RecordKind> = journal
        .read()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            RecordKind::WorkflowStarted,
            RecordKind::StepStarted,
            RecordKind::StepCompleted,
            RecordKind::StepStarted,
            RecordKind::WorkflowFailed,
            RecordKind::StepStarted,
            RecordKind::StepCompleted,
            RecordKind::WorkflowCompleted,
        ]
    );
}

#[tokio::test]
async fn test_file_journal_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let counters = Arc::new(Counters::default());
    counters.fail_b.store(true, Ordering::SeqCst);

    {
        let journal: Arc<dyn Journal> = Arc::new(FileJournal::open(&path).await.unwrap());
        let engine = onboarding_engine(journal, &counters);
        assert_err!(
            engine
                .execute(ExecutionScope::new("user-1"), "onboarding", Value::Null)
                .await
        );
        engine.close().await.unwrap();
    }

    counters.fail_b.store(false, Ordering::SeqCst);
    let journal: Arc<dyn Journal> = Arc::new(FileJournal::open(&path).await.unwrap());
    let engine = onboarding_engine(Arc::clone(&journal), &counters);
    assert_ok!(
        engine
            .execute(ExecutionScope::new("user-1"), "onboarding", Value::Null)
            .await
    );

    assert_eq!(counters.a.load(Ordering::SeqCst), 1);
    assert_eq!(counters.b.load(Ordering::SeqCst), 2);
    let records = journal.read().await.unwrap();
    assert_eq!(step_names(&records), vec!["A", "B"]);
    assert_eq!(
        records.iter().map(|r| r.sequence).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

/// Reads from an inner journal but refuses every append.
struct ReadOnlyJournal(MemoryJournal);

#[async_trait]
impl Journal for ReadOnlyJournal {
    async fn append(&self, _record: NewRecord) -> Result<u64, JournalError> {
        Err(JournalError::Io(std::io::Error::other("disk full")))
    }

    async fn read(&self) -> Result<Vec<Record>, JournalError> {
        self.0.read().await
    }

    async fn close(&self) -> Result<(), JournalError> {
        self.0.close().await
    }
}

#[tokio::test]
async fn test_append_failure_fails_the_step() {
    let counters = Arc::new(Counters::default());
    let engine = onboarding_engine(
        Arc::new(ReadOnlyJournal(MemoryJournal::new())),
        &counters,
    );

    let result = engine
        .execute(ExecutionScope::new("e"), "onboarding", Value::Null)
        .await;
    let error = assert_err!(result);
    assert!(error.is_journal());
    assert_eq!(counters.a.load(Ordering::SeqCst), 1);
    assert_eq!(counters.b.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_retry_policy_applies_to_new_steps() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let engine = Engine::builder()
        .shared_journal(Arc::clone(&journal))
        .define_fn("flaky", move |ctx: DurableContext, _input: Value| {
            let counter = Arc::clone(&counter);
            async move {
                let counter = &counter;
                ctx.step_with(
                    "call",
                    StepOptions::new().retry(RetryPolicy::immediate(3)),
                    move || async move {
                        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(std::io::Error::other("try again"))
                        } else {
                            Ok("done")
                        }
                    },
                )
                .await
                .check()
            }
        })
        .build()
        .unwrap();

    assert_ok!(
        engine
            .execute(ExecutionScope::new("f"), "flaky", Value::Null)
            .await
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(journal.read().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_two_string_steps_replay_from_log() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let calls = Arc::new(AtomicU32::new(0));
    let values = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let (counter, sink) = (Arc::clone(&calls), Arc::clone(&values));

    let engine = Engine::builder()
        .shared_journal(Arc::clone(&journal))
        .define_fn("pair", move |ctx: DurableContext, _input: Value| {
            let (counter, sink) = (Arc::clone(&counter), Arc::clone(&sink));
            async move {
                let counter = &counter;
                let mut a = String::new();
                ctx.step("A", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>("x")
                })
                .await
                .result_into(&mut a)?;
                let mut b = String::new();
                ctx.step("B", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>("y")
                })
                .await
                .result_into(&mut b)?;
                sink.lock().unwrap().extend([a, b]);
                Ok(())
            }
        })
        .build()
        .unwrap();

    assert_ok!(
        engine
            .execute(ExecutionScope::new("p"), "pair", Value::Null)
            .await
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(journal.read().await.unwrap().len(), 2);

    assert_ok!(
        engine
            .execute(ExecutionScope::new("p"), "pair", Value::Null)
            .await
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(journal.read().await.unwrap().len(), 2);
    assert_eq!(*values.lock().unwrap(), vec!["x", "y", "x", "y"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_executions_share_one_journal() {
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let counters = Arc::new(Counters::default());
    let engine = Arc::new(onboarding_engine(Arc::clone(&journal), &counters));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .execute(
                        ExecutionScope::new(format!("user-{i}")),
                        "onboarding",
                        Value::Null,
                    )
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    let records = journal.read().await.unwrap();
    assert_eq!(records.len(), 16);
    let sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, (1..=16).collect::<Vec<_>>());
    for i in 0..8 {
        let history = engine
            .history(&ExecutionId::new(format!("user-{i}")))
            .await
            .unwrap();
        assert_eq!(step_names(&history), vec!["A", "B"]);
    }
}
