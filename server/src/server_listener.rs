use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io;
use tokio::net::TcpListener;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tracing::{info, warn};

use crate::client_handler::ClientHandler;
use crate::config::ServerSettings;
use crate::registry::{outbound, Registry};

const COUNTER_SEED: u64 = 1;

// Accepts connections and hands each one to its own ClientHandler task
pub struct ServerListener {
    listener: TcpListener,
    settings: Arc<ServerSettings>,
    registry: Registry,
    shutdown: CancellationToken,
    counter: AtomicU64,
}

impl ServerListener {
    pub async fn bind(settings: ServerSettings) -> io::Result<Self> {
        let listener = TcpListener::bind(settings.socket_addr()).await?;

        Ok(Self {
            listener,
            settings: Arc::new(settings),
            registry: Registry::new(),
            shutdown: CancellationToken::new(),
            counter: AtomicU64::new(COUNTER_SEED),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Cancelling the returned token stops accepting and closes every open
    /// connection.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn spawn_accept(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    pub async fn run(self) {
        info!("Server listening on {:?}, policy {:?}", self.listener.local_addr().ok(), self.settings.policy);

        loop {
            select! {
                _ = self.shutdown.cancelled() => {
                    info!("Server shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((tcp_socket, addr)) => self.spawn_handler(tcp_socket, addr),
                        Err(e) => warn!(error = %e, "unable to accept connection"),
                    }
                }
            }
        }
    }

    fn spawn_handler(&self, tcp_socket: tokio::net::TcpStream, addr: SocketAddr) {
        info!("Server received new client connection {:?}", &addr);

        let (tcp_read, tcp_write) = tcp_socket.into_split();
        let id = self.counter.fetch_add(1, Ordering::Relaxed);

        let handler = ClientHandler::new(id, addr, tcp_read, outbound(tcp_write),
                                         self.registry.clone(), Arc::clone(&self.settings),
                                         self.shutdown.child_token());

        ClientHandler::spawn(handler);
    }
}
