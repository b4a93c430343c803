//! CLI for tcpsub
//!
//! Subcommands:
//! - `server <PORT>`: run the broker on the configured loopback host
//! - `client <HOST> <PORT> <ROLE> <TOPIC>`: interactive publisher or subscriber

use std::process::ExitCode;

use clap::Parser;
use tcpsub::broker::Role;
use tcpsub::client::PubSubClient;
use tcpsub::config::load_config;
use tcpsub::transport::Server;
use tcpsub::utils::error::BrokerError;
use tcpsub::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tcpsub", version, about)]
enum Command {
    /// Start the broker
    Server {
        /// Port to listen on
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
    },
    /// Connect as a publisher or subscriber and relay stdin/stdout
    Client {
        /// Broker host or IP address
        host: String,
        /// Broker port
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
        /// PUBLISHER or SUBSCRIBER (any case)
        role: Role,
        /// Topic to publish or subscribe on
        #[arg(value_parser = parse_topic)]
        topic: String,
    },
}

fn parse_topic(topic: &str) -> Result<String, String> {
    if topic.trim().is_empty() {
        Err("TOPIC cannot be empty".to_string())
    } else {
        Ok(topic.to_string())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    // exits with usage and a non-zero status on bad arguments
    let cmd = Command::parse();

    let result = match cmd {
        Command::Server { port } => run_server(port).await,
        Command::Client {
            host,
            port,
            role,
            topic,
        } => run_client(&host, port, role, &topic).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(port: u16) -> Result<(), BrokerError> {
    let mut config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            return Err(e.into());
        }
    };
    config.server.port = port;
    logging::init(&config.logging.level);

    let server = Server::bind(&config).await?;
    let runner = server.clone();
    let mut accept = tokio::spawn(async move { runner.run().await });

    info!("Press Ctrl+C to shut down");
    let result = tokio::select! {
        joined = &mut accept => match joined {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "accept loop task failed");
                Ok(())
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    server.shutdown().await;
    info!("Server terminated");
    result
}

async fn run_client(host: &str, port: u16, role: Role, topic: &str) -> Result<(), BrokerError> {
    logging::init("warn");

    println!("Connecting to server {host}:{port} as {role} for topic '{topic}'...");
    let client = match PubSubClient::connect((host, port), role, topic).await {
        Ok(client) => client,
        Err(BrokerError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            println!("Error: Could not connect to server {host}:{port}");
            println!("Make sure the server is running and the address is correct.");
            return Err(BrokerError::Io(e));
        }
        Err(e) => return Err(e),
    };
    println!("Connected to server!");

    client.run_interactive().await?;
    println!("Client terminated.");
    Ok(())
}
