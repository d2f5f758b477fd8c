use std::time::Duration;

use clap::Parser;
use switchboard::SignalingServer;

#[derive(Parser)]
#[command(name = "switchboard", about = "Session relay for clipcast senders and displays")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Seconds between Engine.IO heartbeats.
    #[arg(long, default_value_t = 25)]
    ping_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let server = SignalingServer::new(Duration::from_secs(args.ping_interval_secs));
    server.listen(("0.0.0.0", args.port)).await
}
