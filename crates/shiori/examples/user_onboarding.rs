//! User onboarding workflow that survives a failure.
//!
//! The first run fails while sending the welcome mail. The second run replays
//! the recorded `create_user` step and only retries the mail.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shiori::journal::FileJournal;
use shiori::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
struct User {
    id: u64,
    email: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let path = std::env::temp_dir().join("shiori-onboarding.jsonl");
    let _ = std::fs::remove_file(&path);

    let mail_down = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&mail_down);

    let engine = Engine::builder()
        .journal(FileJournal::open(&path).await?)
        .record_lifecycle(true)
        .define_fn("onboarding", move |ctx: DurableContext, input: Value| {
            let flag = Arc::clone(&flag);
            async move {
                let email = input.as_str().unwrap_or_default().to_string();
                let flag = &flag;

                let user: Option<User> = ctx
                    .step("create_user", move || {
                        let email = email.clone();
                        async move {
                            println!("Creating user {}", email);
                            Ok::<_, std::io::Error>(User { id: 1001, email })
                        }
                    })
                    .await
                    .result()?;
                let user = user.ok_or_else(|| WorkflowError::Failed("no user".to_string()))?;
                let user = &user;

                ctx.step("send_welcome", move || async move {
                    if flag.load(Ordering::SeqCst) {
                        return Err(std::io::Error::other("mail server unavailable"));
                    }
                    println!("Welcome mail sent to {} (id {})", user.email, user.id);
                    Ok(())
                })
                .await
                .check()
            }
        })
        .build()?;

    let input = serde_json::json!("user@example.com");

    match engine
        .execute(ExecutionScope::new("user-1001"), "onboarding", input.clone())
        .await
    {
        Ok(()) => println!("Run 1 completed"),
        Err(e) => println!("Run 1 failed: {}", e),
    }

    mail_down.store(false, Ordering::SeqCst);
    engine
        .execute(ExecutionScope::new("user-1001"), "onboarding", input)
        .await?;
    println!("Run 2 completed");

    for record in engine.history(&ExecutionId::new("user-1001")).await? {
        println!(
            "#{} {} {}",
            record.sequence,
            record.kind,
            record.step_name.as_ref().map(|s| s.as_str()).unwrap_or("-")
        );
    }

    engine.close().await?;
    Ok(())
}
