//! Reads frames sent by the chat server and turns them into display lines.
//!
//! One reader runs per session. It waits on the socket until a whole frame
//! arrives, so there is no polling; it stops once the session is marked as
//! no longer running or the connection fails.

use tokio::io::AsyncRead;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use tracing::{debug, warn};

use chat_protocol::{ChatCodec, DecodeError, Frame, Framing};

use crate::sink::DisplaySink;

pub const READ_FAILED: &str = "Read failed";

// Why the reader loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    Stopped,
    Failed,
}

pub struct ServerReader<R> {
    fr: FramedRead<R, ChatCodec>,
    running: CancellationToken,
}

impl<R> ServerReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// `running` is the session flag: cancelling it stops the reader, and the
    /// reader cancels it itself when the connection fails.
    pub fn new(read: R, framing: Framing, running: CancellationToken) -> Self {
        Self {
            fr: FramedRead::new(read, ChatCodec::new(framing)),
            running,
        }
    }

    pub fn spawn<S>(mut self, sink: S) -> JoinHandle<ReadEnd>
    where
        S: DisplaySink + 'static,
    {
        tokio::spawn(async move {
            self.handle_read(&sink).await
        })
    }

    pub async fn handle_read<S: DisplaySink>(&mut self, sink: &S) -> ReadEnd {
        loop {
            select! {
                biased;
                _ = self.running.cancelled() => {
                    debug!("session stopped, reader exiting");
                    return ReadEnd::Stopped
                }
                value = self.fr.next() => {
                    match value {
                        Some(Ok(frame)) => Self::dispatch(frame, sink).await,
                        Some(Err(e)) => {
                            debug!(error = %e, "server read error");
                            return self.fail(sink).await
                        },
                        None => {
                            debug!("server closed the connection");
                            return self.fail(sink).await
                        },
                    }
                }
            }
        }
    }

    async fn dispatch<S: DisplaySink>(frame: Frame, sink: &S) {
        match frame.action {
            Ok(action) => sink.show(action.render()).await,
            Err(DecodeError::UnrecognizedPayloadType(t)) => debug!("ignoring payload of type {:?}", t),
            Err(e) => debug!(raw = %frame.raw, "dropping frame: {}", e),
        }
    }

    async fn fail<S: DisplaySink>(&mut self, sink: &S) -> ReadEnd {
        // the session closed the socket on purpose, nothing to report
        if self.running.is_cancelled() {
            return ReadEnd::Stopped
        }

        warn!("{}", READ_FAILED);
        sink.show(READ_FAILED.to_string()).await;
        self.running.cancel();
        ReadEnd::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn reader(framing: Framing) -> (ServerReader<DuplexStream>, DuplexStream, CancellationToken) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let running = CancellationToken::new();
        (ServerReader::new(ours, framing, running.clone()), theirs, running)
    }

    async fn collect(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut lines = vec![];
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn renders_text_frames() {
        let (r, mut server, _running) = reader(Framing::Text);
        let (tx, rx) = mpsc::channel(16);
        let task = r.spawn(tx);

        server.write_all(b"new Bob\nsay Alice Hello\nbye Alice\n").await.unwrap();
        drop(server);

        assert_eq!(task.await.unwrap(), ReadEnd::Failed);
        assert_eq!(collect(rx).await, vec![
            "Bob joined the channel.",
            "Alice: Hello",
            "Alice left the channel.",
            READ_FAILED,
        ]);
    }

    #[tokio::test]
    async fn drops_lines_that_are_not_frames() {
        let (r, mut server, _running) = reader(Framing::Text);
        let (tx, rx) = mpsc::channel(16);
        let task = r.spawn(tx);

        server.write_all(b"garbage\nsay Bob\nwho Bob\n\nsay Bob ok\n").await.unwrap();
        drop(server);

        task.await.unwrap();
        assert_eq!(collect(rx).await, vec!["Bob: ok", READ_FAILED]);
    }

    #[tokio::test]
    async fn object_framing_skips_unknown_types() {
        let (r, mut server, _running) = reader(Framing::Object);
        let (tx, rx) = mpsc::channel(16);
        let task = r.spawn(tx);

        server.write_all(concat!(
            "{\"type\":\"poke\",\"name\":\"Bob\"}\n",
            "{\"type\":\"new\",\"name\":\"Bob\"}\n",
            "{broken\n",
            "{\"type\":\"say\",\"name\":\"Bob\",\"message\":\"hey\"}\n",
        ).as_bytes()).await.unwrap();
        drop(server);

        task.await.unwrap();
        assert_eq!(collect(rx).await, vec!["Bob joined the channel.", "Bob: hey", READ_FAILED]);
    }

    #[tokio::test]
    async fn stopping_the_session_is_not_reported() {
        let (r, server, running) = reader(Framing::Text);
        let (tx, rx) = mpsc::channel(16);
        let task = r.spawn(tx);

        running.cancel();
        let end = timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        drop(server);

        assert_eq!(end, ReadEnd::Stopped);
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test]
    async fn failure_marks_the_session_stopped() {
        let (r, server, running) = reader(Framing::Text);
        let (tx, _rx) = mpsc::channel(16);
        let task = r.spawn(tx);

        drop(server);
        assert_eq!(task.await.unwrap(), ReadEnd::Failed);
        assert!(running.is_cancelled());
    }

    #[tokio::test]
    async fn waits_for_partial_frames() {
        let (r, mut server, running) = reader(Framing::Text);
        let (tx, mut rx) = mpsc::channel(16);
        let task = r.spawn(tx);

        server.write_all(b"say Alice Hel").await.unwrap();
        tokio::task::yield_now().await;
        server.write_all(b"lo\n").await.unwrap();

        assert_eq!(timeout(Duration::from_secs(2), rx.recv()).await.unwrap().as_deref(), Some("Alice: Hello"));

        running.cancel();
        assert_eq!(task.await.unwrap(), ReadEnd::Stopped);
    }
}
