//! Offline Replay: events survive a lost connection and a restart
//!
//! 1. Connectivity drops; flushes spill into the offline buffer
//! 2. The process "restarts" with the same directory-backed store
//! 3. `init()` restores the backlog exactly once and it is delivered
//!
//! Run with: cargo run --example offline_replay

use std::sync::Arc;

use abtrack::config::DispatcherConfig;
use abtrack::kv::FileKvStore;
use abtrack::telemetry::{BatchDispatcher, Event, FlushMode};
use abtrack::transport::RecordingTransport;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!("=== abtrack: Offline Replay Demo ===\n");

    let dir = tempfile::tempdir()?;
    let transport = Arc::new(RecordingTransport::new());
    let config = DispatcherConfig::default().with_batch_size(100);

    println!("Session 1: network goes down");
    {
        let dispatcher = Arc::new(BatchDispatcher::new(
            config.clone(),
            "session-1",
            Arc::clone(&transport),
            FileKvStore::open(dir.path())?,
        ));
        dispatcher.init().await?;
        dispatcher.set_online(false);

        for section in ["hero", "events", "mentoring", "donate", "footer"] {
            dispatcher.enqueue(Event::new("section_view").section(section));
        }
        let outcome = dispatcher.flush(FlushMode::Async).await;
        println!("  flush outcome: {outcome:?}");
        println!("  buffered offline: {}", dispatcher.offline().len().await);
    }

    println!("\nSession 2: page reloads with connectivity back");
    let dispatcher = Arc::new(BatchDispatcher::new(
        config,
        "session-2",
        Arc::clone(&transport),
        FileKvStore::open(dir.path())?,
    ));
    let restored = dispatcher.init().await?;
    println!("  restored from disk: {restored}");
    println!("  pending: {:?}", dispatcher.pending_names());

    let outcome = dispatcher.flush(FlushMode::Async).await;
    println!("  flush outcome: {outcome:?}");
    println!("  delivered: {:?}", transport.event_names("/events"));

    let again = BatchDispatcher::new(
        DispatcherConfig::default(),
        "session-3",
        Arc::clone(&transport),
        FileKvStore::open(dir.path())?,
    );
    println!("\nSession 3 restores {} events (backlog was cleared)", again.init().await?);

    Ok(())
}
