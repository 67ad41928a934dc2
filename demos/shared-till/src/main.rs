//! Two cashiers sharing one till.
//!
//! ```bash
//! cargo run -p shared-till -- /tmp/till-sessions.json
//! TILLGUARD_LOG=debug cargo run -p shared-till
//! ```
//!
//! Lifecycle events are printed to stdout as JSON lines; logs go to stderr.
//! Run it twice against the same file to see profiles survive a restart.

use std::path::PathBuf;

use serde_json::json;
use tillguard::prelude::*;
use tillguard::telemetry;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns the id of the profile called `name`, creating it if needed.
async fn find_or_create(
    sessions: &SessionHandle,
    name: &str,
    pin: &str,
) -> Result<ProfileId, TillguardError> {
    let existing = sessions
        .list_all()
        .await?
        .into_iter()
        .find(|p| p.name == name);
    match existing {
        Some(profile) => Ok(profile.id),
        None => sessions.create(name, pin).await,
    }
}

/// Prints the outcome of an operation that is expected to fail sometimes.
fn report<T>(what: &str, result: &Result<T, TillguardError>) {
    match result {
        Ok(_) => eprintln!("{what}: ok"),
        Err(e) => eprintln!("{what}: {e}"),
    }
}

fn store_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("shared-till-sessions.json"))
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    let path = store_path();
    eprintln!("using session store {}", path.display());

    let service = SessionService::builder().json_file(&path)?.spawn();
    let sessions = service.handle();

    let mut events = sessions.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "could not encode event"),
            }
        }
    });

    let alice = find_or_create(&sessions, "Alice", "1234").await?;
    let bob = find_or_create(&sessions, "Bob", "5678").await?;

    // Alice rings up a sale, then steps away.
    sessions.switch_to(&alice, Some("1234")).await?;
    sessions.update_url(&alice, "https://pos.example/checkout").await?;
    sessions
        .update_state(&alice, json_object(json!({"cart": [{"sku": "A-1", "qty": 2}]})))
        .await?;
    sessions.lock(&alice).await?;

    // Bob takes over and fumbles Alice's PIN.
    sessions.switch_to(&bob, Some("5678")).await?;
    report("switch to Alice without PIN", &sessions.switch_to(&alice, None).await);
    report("unlock Alice with 0000", &sessions.unlock(&alice, "0000").await);
    report("unlock Alice with 1111", &sessions.unlock(&alice, "1111").await);

    // Alice comes back; her cart is where she left it.
    let resumed = sessions.unlock(&alice, "1234").await?;
    eprintln!(
        "Alice resumed at {} with state {}",
        resumed.current_url.as_deref().unwrap_or("-"),
        serde_json::Value::Object(resumed.state)
    );

    for profile in sessions.list_all().await? {
        eprintln!(
            "{:<8} locked={:<5} last seen {}",
            profile.name, profile.is_locked, profile.last_accessed_at
        );
    }

    service.shutdown().await?;
    drop(sessions);
    let _ = printer.await;
    Ok(())
}

fn json_object(value: serde_json::Value) -> ProfileState {
    match value {
        serde_json::Value::Object(map) => map,
        _ => ProfileState::new(),
    }
}
