use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use tracing::{debug, info, warn};

use chat_protocol::{encode_frame, Action, ChatCodec, Frame, ProtocolError};

use crate::config::ServerSettings;
use crate::delivery::Delivery;
use crate::error::Violation;
use crate::registry::{ClientEntry, ConnectionId, OnConflict, Outbound, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Closed,
}

// Outcome of waiting for the next frame
enum Read {
    Frame(Frame),
    Eof,
    Cancelled,
    TimedOut,
    Failed(ProtocolError),
}

// Handles one accepted connection: reads its frames, keeps the registry in
// step with them and asks Delivery to fan them out.
// Essentially this models a client actor on the server side
pub struct ClientHandler<R> {
    connection_id: ConnectionId,
    peer: SocketAddr,
    input: Option<FramedRead<R, ChatCodec>>,
    output: Outbound,
    registry: Registry,
    delivery: Delivery,
    settings: Arc<ServerSettings>,
    cancel: CancellationToken,
    state: ConnectionState,
}

impl<R> ClientHandler<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(connection_id: ConnectionId, peer: SocketAddr, tcp_read: R, output: Outbound,
               registry: Registry, settings: Arc<ServerSettings>, cancel: CancellationToken) -> Self {
        let delivery = Delivery::new(&registry, settings.write_timeout());

        Self {
            connection_id,
            peer,
            input: Some(FramedRead::new(tcp_read, ChatCodec::new(settings.framing))),
            output,
            registry,
            delivery,
            settings,
            cancel,
            state: ConnectionState::Connected,
        }
    }

    // Spawn tokio task to handle socket reads from this client
    pub fn spawn(mut h: ClientHandler<R>) -> JoinHandle<()> {
        tokio::spawn(async move {
            h.run().await;
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    // Loop over incoming frames until the connection closes or gets kicked
    pub async fn run(&mut self) {
        info!(peer = %self.peer, id = self.connection_id, "connection opened");

        while self.state == ConnectionState::Connected {
            match self.next_frame().await {
                Read::Frame(frame) => {
                    info!("{}: {}", self.peer, frame.raw);

                    if let Err(v) = self.handle_frame(frame).await {
                        warn!(peer = %self.peer, "{}", v);
                        self.kick_if_on().await;
                    }
                },
                Read::Eof => {
                    info!(peer = %self.peer, "connection ended");
                    self.teardown().await;
                },
                Read::Cancelled => {
                    debug!(peer = %self.peer, "connection closed locally");
                    self.teardown().await;
                },
                Read::TimedOut => {
                    warn!(peer = %self.peer, "no frame within {:?}, closing", self.settings.read_timeout());
                    self.teardown().await;
                },
                Read::Failed(e) => {
                    // a read failing after we closed the connection ourselves is a normal shutdown
                    if self.cancel.is_cancelled() {
                        debug!(peer = %self.peer, error = %e, "read ended after local close");
                    } else {
                        warn!(peer = %self.peer, error = %e, "Read failed");
                    }
                    self.teardown().await;
                },
            }
        }
    }

    async fn next_frame(&mut self) -> Read {
        let limit = self.settings.read_timeout();
        let cancel = &self.cancel;
        let input = match self.input.as_mut() {
            Some(input) => input,
            None => return Read::Cancelled,
        };

        select! {
            biased;
            _ = cancel.cancelled() => Read::Cancelled,
            read = read_frame(input, limit) => read,
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), Violation> {
        let action = frame.action?;
        let policy = self.settings.policy;

        if policy.check_client_ip_and_port {
            if let Some(view) = self.registry.lookup(action.name()).await {
                if view.addr != self.peer {
                    return Err(Violation::AddressMismatch {
                        name: action.name().to_owned(),
                        expected: view.addr,
                        actual: self.peer,
                    });
                }
            }
        }

        match action {
            Action::New { name } => {
                let on_conflict = if policy.check_new_client_name { OnConflict::Reject } else { OnConflict::Replace };
                let entry = ClientEntry::new(self.peer, self.connection_id, Arc::clone(&self.output), self.cancel.clone());

                let existed = self.registry.register(name.clone(), entry, on_conflict).await;
                if existed && on_conflict == OnConflict::Reject {
                    return Err(Violation::DuplicateName(name));
                }

                let n = self.delivery.broadcast_except(&frame.raw, &name).await;
                info!(name = %name, replaced = existed, recipients = n, "ok new");
            },
            Action::Bye { name } => {
                if let Some(entry) = self.registry.remove(&name).await {
                    entry.close().await;
                }

                let n = self.delivery.broadcast_except(&frame.raw, &name).await;
                info!(name = %name, recipients = n, "ok bye");
            },
            Action::Say { name, .. } => {
                let n = self.delivery.broadcast_except(&frame.raw, &name).await;
                info!(name = %name, recipients = n, "ok say");
            },
        }

        Ok(())
    }

    async fn kick_if_on(&mut self) {
        if self.settings.policy.kick_on_hack {
            info!(peer = %self.peer, "kicking connection");
            self.teardown().await;
        }
    }

    /// Releases everything this connection holds. Participants it registered
    /// are removed and announced as gone. Safe to call more than once.
    pub async fn teardown(&mut self) {
        if self.state == ConnectionState::Closed {
            return
        }
        self.state = ConnectionState::Closed;
        self.cancel.cancel();

        for (name, _entry) in self.registry.remove_owned_by(self.connection_id).await {
            info!(name = %name, "{} left without bye", name);

            match encode_frame(&Action::bye(name.as_str()), self.settings.framing) {
                Ok(raw) => { self.delivery.broadcast_except(&raw, &name).await; },
                Err(e) => warn!(error = %e, "unable to encode bye frame"),
            }
        }

        self.input.take();

        if let Err(e) = self.output.lock().await.shutdown().await {
            debug!(peer = %self.peer, error = %e, "output already closed");
        }

        info!(peer = %self.peer, "connection closed");
    }
}

async fn read_frame<R>(input: &mut FramedRead<R, ChatCodec>, limit: Option<Duration>) -> Read
where
    R: AsyncRead + Unpin,
{
    let next = match limit {
        Some(limit) => match timeout(limit, input.next()).await {
            Ok(next) => next,
            Err(_) => return Read::TimedOut,
        },
        None => input.next().await,
    };

    match next {
        Some(Ok(frame)) => Read::Frame(frame),
        Some(Err(e)) => Read::Failed(e),
        None => Read::Eof,
    }
}
