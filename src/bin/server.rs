use clap::Parser;
use std::path::PathBuf;
use stompbind::router::{self, TopicRouter};
use stompbind::server::{http, ServerConfig, ServerError};
use stompbind::stomp::StompClient;
use tokio_util::sync::CancellationToken;

/// Relay todo records over a STOMP broker and serve the demo pages.
#[derive(Parser, Debug)]
#[command(name = "stompbind-server", version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, env = "STOMPBIND_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    broker_host: Option<String>,

    #[arg(long)]
    broker_port: Option<u16>,

    #[arg(long)]
    http_port: Option<u16>,

    /// Document root for static files
    #[arg(long)]
    root: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<ServerConfig, ServerError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.broker_host {
            config.broker.host = host;
        }
        if let Some(port) = self.broker_port {
            config.broker.port = port;
        }
        if let Some(port) = self.http_port {
            config.http.port = port;
        }
        if let Some(root) = self.root {
            config.http.root = root;
        }
        Ok(config)
    }
}

async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let token = CancellationToken::new();

    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            ctrl_c.cancel();
        }
    });

    let http_task = tokio::spawn(http::serve(config.http.clone(), token.clone()));

    let (client, inbound) = StompClient::connect(&config.broker).await?;
    let router = TopicRouter::new(config.router());
    let router = router::run(router, client, inbound, config.ping_period(), token.clone()).await;
    tracing::info!(records = router.store().len(), "router stopped");

    token.cancel();
    match http_task.await {
        Ok(result) => result,
        Err(e) => Err(ServerError::Http(format!("http task: {e}"))),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    tracing::info!(version = stompbind::VERSION, "stompbind-server starting");

    let result = match Cli::parse().into_config() {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
