use std::collections::HashMap;
use std::net::SocketAddr;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type ConnectionId = u64;
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

// write side of a connection, shared between its worker and the broadcasters
pub type Outbound = Arc<Mutex<BoxedWriter>>;

pub fn outbound<W>(w: W) -> Outbound
where
    W: AsyncWrite + Send + 'static,
{
    Arc::new(Mutex::new(Box::pin(w)))
}

// Stands in for an output whose stream can no longer be trusted: every write
// fails, shutting down succeeds
struct Severed;

impl AsyncWrite for Severed {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Swaps the real writer out for one that refuses every write. Dropping the
/// real writer closes that direction of the connection.
pub fn sever(writer: &mut BoxedWriter) {
    *writer = Box::pin(Severed);
}

/// One broadcast recipient: its name, its output and the token of the
/// connection that owns it.
pub struct Target {
    pub name: String,
    pub output: Outbound,
    pub closer: CancellationToken,
}

/// Registered participant: where it connected from, how to reach it and how
/// to close the connection that registered it.
pub struct ClientEntry {
    addr: SocketAddr,
    connection_id: ConnectionId,
    output: Outbound,
    closer: CancellationToken,
}

// Read only copy of an entry used for validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryView {
    pub addr: SocketAddr,
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    Reject,
    Replace,
}

impl ClientEntry {
    pub fn new(addr: SocketAddr, connection_id: ConnectionId, output: Outbound, closer: CancellationToken) -> Self {
        Self {
            addr,
            connection_id,
            output,
            closer,
        }
    }

    pub fn view(&self) -> EntryView {
        EntryView {
            addr: self.addr,
            connection_id: self.connection_id,
        }
    }

    /// Shuts the output down and cancels the owning connection, whose worker
    /// then wakes from its pending read and tears itself down.
    pub async fn close(self) {
        if let Err(e) = self.output.lock().await.shutdown().await {
            debug!(addr = %self.addr, error = %e, "output already closed");
        }
        self.closer.cancel();
    }
}

/// Name to entry map shared by every connection worker. All access goes
/// through one async mutex so lookups, mutations and broadcast snapshots
/// never interleave.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<Mutex<HashMap<String, ClientEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entry` under `name`. Returns whether an entry already existed;
    /// with `OnConflict::Reject` an existing entry is left untouched.
    pub async fn register(&self, name: String, entry: ClientEntry, on_conflict: OnConflict) -> bool {
        let mut entries = self.entries.lock().await;
        let existed = entries.contains_key(&name);

        if !existed || on_conflict == OnConflict::Replace {
            entries.insert(name, entry);
        }

        existed
    }

    pub async fn lookup(&self, name: &str) -> Option<EntryView> {
        self.entries.lock().await.get(name).map(ClientEntry::view)
    }

    // caller takes ownership, typically to close() it
    pub async fn remove(&self, name: &str) -> Option<ClientEntry> {
        self.entries.lock().await.remove(name)
    }

    pub async fn remove_owned_by(&self, connection_id: ConnectionId) -> Vec<(String, ClientEntry)> {
        let mut entries = self.entries.lock().await;
        let names: Vec<String> = entries.iter()
            .filter(|(_, e)| e.connection_id == connection_id)
            .map(|(n, _)| n.clone())
            .collect();

        names.into_iter()
            .filter_map(|n| entries.remove(&n).map(|e| (n, e)))
            .collect()
    }

    /// Snapshot of every entry except `excluding`, taken under the lock so it
    /// never observes a half applied register or remove.
    pub async fn broadcast_targets(&self, excluding: &str) -> Vec<Target> {
        self.entries.lock().await.iter()
            .filter(|(n, _)| n.as_str() != excluding)
            .map(|(n, e)| Target {
                name: n.clone(),
                output: Arc::clone(&e.output),
                closer: e.closer.clone(),
            })
            .collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.lock().await.contains_key(name)
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
