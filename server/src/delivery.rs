use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::registry::{sever, BoxedWriter, Registry, Target};

// Fans a raw frame out to registered participants.
// A target whose write fails or stalls may hold a partial line, so its output
// is severed and its connection cancelled. Removing the entry is left to that
// target's own connection worker.
#[derive(Clone)]
pub struct Delivery {
    registry: Registry,
    write_timeout: Duration,
}

impl Delivery {
    pub fn new(registry: &Registry, write_timeout: Duration) -> Self {
        Delivery {
            registry: registry.clone(),
            write_timeout,
        }
    }

    /// Writes `raw` plus a newline to every participant except `sender` and
    /// returns how many of them received it.
    pub async fn broadcast_except(&self, raw: &str, sender: &str) -> usize {
        // snapshot first so no write happens while the registry is locked
        let targets = self.registry.broadcast_targets(sender).await;

        let mut line = Vec::with_capacity(raw.len() + 1);
        line.extend_from_slice(raw.as_bytes());
        line.push(b'\n');
        let line = Bytes::from(line);

        let sends = targets.into_iter().map(|target| {
            let line = line.clone();
            async move {
                let delivered = self.deliver(&target, &line).await;
                if delivered {
                    debug!("{} --> {}", raw, target.name);
                }
                delivered
            }
        });

        join_all(sends).await.into_iter().filter(|delivered| *delivered).count()
    }

    async fn deliver(&self, target: &Target, line: &[u8]) -> bool {
        let mut w = match timeout(self.write_timeout, target.output.lock()).await {
            Ok(w) => w,
            Err(_) => {
                warn!(target_name = %target.name, "output busy, frame not delivered");
                return false
            },
        };

        let failure = match timeout(self.write_timeout, write_line(&mut w, line)).await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "timed out".to_string(),
        };

        // the guard is still held, nothing else gets appended to a partial line
        warn!(target_name = %target.name, error = %failure, "unable to deliver frame, dropping connection");
        sever(&mut w);
        target.closer.cancel();
        false
    }
}

async fn write_line(w: &mut BoxedWriter, line: &[u8]) -> std::io::Result<()> {
    w.write_all(line).await?;
    w.flush().await
}
