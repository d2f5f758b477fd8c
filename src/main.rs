use std::sync::Arc;

use clap::{Parser, Subcommand};
use clipcast::{
    Result,
    config::Config,
    display::ConsoleRenderer,
    networking::{SessionLink, SignalingChannel, webrtc::WebRTCFactory},
    orchestrator::{Mode, RelayHandle, RelayOrchestrator},
    producers::{forward_lines, watch_clipboard},
    session_id::SessionId,
    share::share_banner,
};
use tokio::{io::BufReader, sync::mpsc};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(
    name = "clipcast",
    about = "Push clipboard or typed text to displays in the same session"
)]
struct Cli {
    /// Relay to connect to, overriding the config file.
    #[arg(long, env = "CLIPCAST_RELAY_URL", global = true)]
    relay_url: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Share the clipboard (or stdin) with every display that joins.
    Host {
        /// Reuse a session name instead of generating one.
        #[arg(long)]
        session: Option<SessionId>,
        /// Send stdin lines instead of watching the clipboard.
        #[arg(long)]
        stdin: bool,
    },
    /// Show what a host sends.
    Display {
        #[arg(long)]
        session: SessionId,
    },
    /// Send stdin lines through the relay without WebRTC.
    Type {
        #[arg(long)]
        session: Option<SessionId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {e}");
    }

    let mut config = Config::load();
    if let Some(url) = cli.relay_url {
        config.server_url = url;
    }

    let (mode, session_id, from_stdin) = match cli.action {
        Action::Host { session, stdin } => {
            (Mode::Host, session.unwrap_or_else(SessionId::generate), stdin)
        }
        Action::Display { session } => (Mode::Display, session, false),
        Action::Type { session } => {
            (Mode::Typed, session.unwrap_or_else(SessionId::generate), true)
        }
    };

    let (event_tx, event_rx) = mpsc::channel(64);
    let channel =
        SignalingChannel::connect(&config.server_url, config.connect_timeout(), event_tx).await?;
    let link = SessionLink::join(channel, session_id.clone())?;

    if mode != Mode::Display {
        println!("{}", share_banner(&session_id, &config.share_base_url));
    }

    let factory = Arc::new(WebRTCFactory::new(&config.stun_servers, config.channel_label.clone())?);
    let (orchestrator, handle) = RelayOrchestrator::new(
        mode,
        link,
        event_rx,
        factory,
        Box::new(ConsoleRenderer::new()),
        config.retry_policy(),
    );
    let orchestrator = tokio::spawn(orchestrator.run());

    match mode {
        Mode::Display => {}
        _ if from_stdin => spawn_line_reader(handle.clone()),
        _ => {
            let producer = handle.clone();
            let poll_interval = config.poll_interval();
            tokio::spawn(async move {
                if let Err(e) = watch_clipboard(producer.clone(), poll_interval).await {
                    tracing::error!("{}", e);
                    producer.shutdown();
                }
            });
        }
    }

    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            interrupt.shutdown();
        }
    });

    orchestrator.await??;
    tracing::info!("Session {} closed.", session_id);
    Ok(())
}

fn spawn_line_reader(handle: RelayHandle) {
    tokio::spawn(async move {
        match forward_lines(BufReader::new(tokio::io::stdin()), &handle).await {
            Ok(sent) => tracing::info!("Input ended after {} messages", sent),
            Err(e) => tracing::error!("Failed to read stdin: {}", e),
        }
        handle.shutdown();
    });
}
