use std::net::SocketAddr;

use clap::Parser;
use tower_http::trace::TraceLayer;

#[derive(Parser, Debug)]
#[command(name = "mock-chat-server", about = "A standalone guild-chat server for local testing")]
struct Cli {
    /// Address to bind the HTTP+WS server to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Base URL attachment links are built from; must be reachable from
    /// whatever client talks to this server.
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "mock_chat_server=info".into()))
        .init();

    let cli = Cli::parse();
    let base_url = cli.base_url.unwrap_or_else(|| format!("http://{}", cli.listen));

    let app = mock_chat_server::app(base_url).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.listen).await.expect("failed to bind listen address");
    tracing::info!(addr = %cli.listen, "mock chat server listening");
    axum::serve(listener, app).await.expect("server error");
}
