//! Turns what the user types into session input.
//!
//! Stdin is read on a plain thread and handed over through a channel, so a
//! session can finish while the thread is still parked in a read.

use std::io as stdio;
use std::io::{stdout, BufRead, Write};
use std::thread;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use chat_protocol::MESSAGE_MAX_LEN;

pub const QUIT: &str = "\\quit";
const USER_LINES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    // One or more messages, each short enough for a single frame
    Say(Vec<String>),
    Quit,
    Empty,
}

pub struct InputReader;

impl InputReader {
    // blocking function to gather user input from std::io::stdin
    // should be called first for name registration
    pub fn blocking_read(prompt: &str) -> stdio::Result<Option<String>> {
        let mut buf = String::new();

        print!("{} ", prompt);
        stdout().flush()?;  // Since stdout is line buffered need to explicitly flush

        if stdio::stdin().read_line(&mut buf)? == 0 {
            return Ok(None)
        }

        Ok(Some(buf.trim_end().to_owned()))
    }

    /// Streams stdin lines until end of input or a read error.
    pub fn stdin_lines() -> ReceiverStream<String> {
        let (tx, rx) = mpsc::channel(USER_LINES);

        thread::spawn(move || {
            for line in stdio::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break; // session is gone
                        }
                    },
                    Err(e) => {
                        debug!(error = %e, "stdin read failed");
                        break;
                    },
                }
            }
            debug!("stdin closed");
        });

        ReceiverStream::new(rx)
    }

    pub fn parse(line: &str) -> Input {
        let line = line.trim_end_matches(['\r', '\n']);

        match line {
            QUIT => {
                info!("Session terminated by user...");
                Input::Quit
            },
            "" => Input::Empty,
            l => Input::Say(split_message(l)),
        }
    }
}

/// Splits `line` into pieces of at most `MESSAGE_MAX_LEN` characters,
/// never inside a character.
pub fn split_message(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();

    chars.chunks(MESSAGE_MAX_LEN)
        .map(|c| c.iter().collect())
        .collect()
}
