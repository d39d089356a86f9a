//! echat console client
//!
//! Reads commands from stdin and prints chat events to stdout. Logs go to a
//! file so they never interleave with the conversation.

use echat_client::{
    parse_command, ClientConfig, ClientSessionFactory, ConfigLoader, ParseError,
};
use echat_net::Client;
use echat_utils::{init_logging_with_config, EchatError, LogConfig, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();
    init_logging_with_config(LogConfig::client())?;

    let config = load_config(&args)?;
    info!(?config, "echat client starting");

    match run(config).await {
        Ok(()) => {
            info!("echat client exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "echat client error");
            eprintln!("Error: {}", e);
            Err(e)
        }
    }
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(addr) = &args.addr {
        config.server_addr = addr.clone();
    }
    ConfigLoader::validate(&config)?;
    Ok(config)
}

async fn run(config: ClientConfig) -> Result<()> {
    let (factory, mut events) = ClientSessionFactory::new(config.heartbeat_interval());
    let commands = factory.commands();
    let client = Client::new(
        config.server_addr.clone(),
        factory,
        config.connection_config(),
    );

    let shutdown = CancellationToken::new();
    client.start(&shutdown).await.map_err(EchatError::from)?;
    println!("connected to {}", client.addr());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    let closed = client.closed();
    tokio::pin!(ctrl_c, closed);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            _ = &mut closed => break,
            Some(event) = events.recv() => println!("{}", event),
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                let command = match parse_command(&line) {
                    Ok(command) => command,
                    Err(ParseError::Empty) => continue,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };
                let Some(connection) = client.connection() else {
                    break;
                };
                commands.submit(&connection, command).map_err(EchatError::from)?;
            }
        }
    }

    shutdown.cancel();
    client.stop().await;
    while let Ok(event) = events.try_recv() {
        println!("{}", event);
    }
    Ok(())
}
