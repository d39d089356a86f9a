//! echat server daemon
//!
//! Loads configuration, binds the listener and serves until interrupted.

use echat_net::Server;
use echat_server::{ChatSessionFactory, ChatWorld, ConfigLoader, ServerConfig};
use echat_utils::{init_logging_with_config, EchatError, LogConfig, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();
    init_logging_with_config(LogConfig::server())?;

    let config = load_config(&args)?;
    info!(?config, "echat server starting");

    if let Err(e) = run(config).await {
        error!(error = %e, "server error");
        return Err(e);
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(listen) = &args.listen {
        config.listen_addr = listen.clone();
    }
    ConfigLoader::validate(&config)?;
    Ok(config)
}

async fn run(config: ServerConfig) -> Result<()> {
    let factory = ChatSessionFactory::new(ChatWorld::shared(), config.idle_timeout());
    let server = Server::bind(config.listen_addr.as_str(), factory, config.connection_config())
        .await
        .map_err(EchatError::from)?;

    let shutdown = CancellationToken::new();
    server.start(&shutdown).map_err(EchatError::from)?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("interrupt received, shutting down");
        }
        _ = server.stopped() => {
            info!("accept loop exited");
        }
    }

    shutdown.cancel();
    server.stop().await;
    info!("echat server exiting");
    Ok(())
}
