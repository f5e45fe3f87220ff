use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt;

use chat_protocol::Framing;
use chat_server::config::ServerSettings;
use chat_server::error::ServerError;
use chat_server::server_listener::ServerListener;

#[derive(Parser, Debug)]
#[command(author, version, about = "Line protocol chat relay server", long_about = None)]
struct Args {
    /// Settings file, defaults to ./chat_server.toml when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind, overrides the settings file
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on, overrides the settings file
    #[arg(long)]
    port: Option<u16>,

    /// Frame format: text or object
    #[arg(long)]
    framing: Option<Framing>,

    /// Seconds a connection may stay silent before it is closed, 0 disables.
    /// Clients send nothing while they only listen, so with a limit set a
    /// quiet listener is dropped after that long (default 300)
    #[arg(long)]
    read_timeout_secs: Option<u64>,

    #[arg(long, default_value = "info")]
    log_level: Level,
}

impl Args {
    fn apply(&self, settings: &mut ServerSettings) {
        if let Some(bind) = &self.bind {
            settings.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(framing) = self.framing {
            settings.framing = framing;
        }
        if let Some(secs) = self.read_timeout_secs {
            settings.read_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();

    fmt()
        .compact()
        .with_max_level(args.log_level)
        .init();

    let mut settings = ServerSettings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    settings.validate()?;

    info!("Server starting.. {:?}", settings.socket_addr());

    let listener = ServerListener::bind(settings).await?;
    let shutdown = listener.shutdown_token();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown.cancel(),
            Err(e) => warn!(error = %e, "unable to listen for ctrl-c"),
        }
    });

    listener.run().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn read_timeout_can_be_disabled_from_the_command_line() {
        let args = Args::try_parse_from(["chat_server", "--read-timeout-secs", "0", "--port", "5000"]).unwrap();
        let mut settings = ServerSettings::default();
        args.apply(&mut settings);

        assert_eq!(settings.read_timeout(), None);
        assert_eq!(settings.port, 5000);
    }

    #[test]
    fn flags_left_out_keep_the_settings() {
        let args = Args::try_parse_from(["chat_server"]).unwrap();
        let mut settings = ServerSettings::default();
        args.apply(&mut settings);

        assert_eq!(settings, ServerSettings::default());
        assert_eq!(settings.read_timeout(), Some(Duration::from_secs(300)));
    }
}
