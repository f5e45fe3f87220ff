use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::fmt;

use chat_protocol::Framing;

use chat_client::client::Client;
use chat_client::error::ClientError;
use chat_client::input_reader::InputReader;
use chat_client::settings::{ClientSettings, DEFAULT_SERVER};
use chat_client::sink::StdoutSink;

const GREETINGS: &str = "$ Welcome to chat! \n$ Commands: \\quit\n$ Please input chat name: ";

#[derive(Parser, Debug)]
#[command(author, version, about = "Line protocol chat relay client", long_about = None)]
struct Args {
    /// Server address as host:port
    #[arg(long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Chat name, asked for on startup when missing
    #[arg(long)]
    name: Option<String>,

    /// Frame format: text or object, must match the server
    #[arg(long, default_value_t = Framing::Text)]
    framing: Framing,

    #[arg(long, default_value = "warn")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let args = Args::parse();

    fmt()
        .compact() // use abbreviated log format
        .with_max_level(args.log_level)
        .init(); // set as default subscriber

    let name = match args.name {
        Some(name) => name,
        None => match InputReader::blocking_read(GREETINGS)? {
            Some(name) => name,
            None => return Ok(()),
        },
    };

    let settings = ClientSettings {
        server: args.server,
        name,
        framing: args.framing,
    };

    let client = Client::connect(settings).await
        .map_err(|e| { error!("{}", e); e })?;

    client.run(StdoutSink, InputReader::stdin_lines()).await
}
