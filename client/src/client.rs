use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::select;
use tokio_stream::{Stream, StreamExt};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use futures::SinkExt; // provides send/close on top of FramedWrite

use tracing::{debug, error, info, warn};

use chat_protocol::{Action, ChatCodec};

use crate::error::ClientError;
use crate::input_reader::{Input, InputReader};
use crate::server_reader::ServerReader;
use crate::settings::ClientSettings;
use crate::sink::DisplaySink;

// How the input loop ended
enum Exit {
    Leave,
    ServerGone,
}

/// One chat session against the relay server.
pub struct Client {
    settings: ClientSettings,
    read: Option<OwnedReadHalf>,
    fw: FramedWrite<OwnedWriteHalf, ChatCodec>,
    running: CancellationToken,
}

impl Client {
    pub async fn connect(settings: ClientSettings) -> Result<Client, ClientError> {
        settings.validate()?;

        info!("Client starting, connecting to server {:?}", &settings.server);

        let stream = TcpStream::connect(&settings.server).await
            .map_err(|e| { error!("Unable to connect to server"); e })?;

        // split tcpstream so we can hand off to r & w tasks
        let (read, write) = stream.into_split();

        Ok(Client {
            fw: FramedWrite::new(write, ChatCodec::new(settings.framing)),
            read: Some(read),
            settings,
            running: CancellationToken::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Joins the channel, shows server events on `sink` and sends each input
    /// line as a message. Returns once the user quits, input runs dry or the
    /// server goes away.
    pub async fn run<S, I>(mut self, sink: S, mut input: I) -> Result<(), ClientError>
    where
        S: DisplaySink + 'static,
        I: Stream<Item = String> + Unpin,
    {
        let read = match self.read.take() {
            Some(read) => read,
            None => return Ok(()),
        };

        self.fw.send(Action::new(self.settings.name.as_str())).await?;
        info!(name = %self.name(), "joined");

        let reader = ServerReader::new(read, self.settings.framing, self.running.clone()).spawn(sink);

        let result = match self.forward(&mut input).await {
            Ok(Exit::Leave) => self.leave().await,
            Ok(Exit::ServerGone) => Ok(()),
            Err(e) => Err(e),
        };

        self.running.cancel();
        match reader.await {
            Ok(end) => debug!("server reader finished {:?}", end),
            Err(e) => warn!(error = %e, "server reader task failed"),
        }

        result
    }

    async fn forward<I>(&mut self, input: &mut I) -> Result<Exit, ClientError>
    where
        I: Stream<Item = String> + Unpin,
    {
        loop {
            select! {
                _ = self.running.cancelled() => {
                    info!("Server Remote has closed");
                    return Ok(Exit::ServerGone)
                }
                line = input.next() => {
                    let line = match line {
                        Some(line) => line,
                        None => {
                            debug!("end of input");
                            return Ok(Exit::Leave)
                        },
                    };

                    match InputReader::parse(&line) {
                        Input::Say(parts) => {
                            for part in parts {
                                self.fw.send(Action::say(self.settings.name.as_str(), part)).await?;
                            }
                        },
                        Input::Quit => return Ok(Exit::Leave),
                        Input::Empty => (),
                    }
                }
            }
        }
    }

    // Stop the reader before the server closes our socket, so the
    // closure is not reported as a failed read
    async fn leave(&mut self) -> Result<(), ClientError> {
        self.running.cancel();

        self.fw.send(Action::bye(self.settings.name.as_str())).await?;
        self.fw.close().await?;

        info!(name = %self.name(), "left");
        Ok(())
    }
}
