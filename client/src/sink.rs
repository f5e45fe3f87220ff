//! Where decoded server events end up.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Accepts one line of text per decoded event.
#[async_trait]
pub trait DisplaySink: Send + Sync {
    async fn show(&self, line: String);
}

// Prints every event on its own line
pub struct StdoutSink;

#[async_trait]
impl DisplaySink for StdoutSink {
    async fn show(&self, line: String) {
        println!("{}", line);
    }
}

// Lets another task (or a test) consume the events
#[async_trait]
impl DisplaySink for mpsc::Sender<String> {
    async fn show(&self, line: String) {
        if self.send(line).await.is_err() {
            debug!("display receiver dropped");
        }
    }
}
