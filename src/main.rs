//! WordWire - Fixed-frame 64-bit request/response server
//!
//! Serves a custom 8-byte binary protocol over TCP: every inbound message
//! is confirmed, requests are dispatched to a capability table and answered
//! with a 64-bit response word.

mod config;
mod dispatch;
mod network;
mod protocol;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use tokio::task::JoinSet;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use dispatch::{StandardDispatcher, URI_GET_RANDOM_NUMBER, URI_GET_SERVER_NAME, URI_GET_TIME};
use network::{AcceptMode, Listener, ProbeClient};

/// WordWire - fixed-frame 64-bit request/response server
#[derive(Parser)]
#[command(name = "wordwire")]
#[command(author = "WordWire Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Serve an 8-byte binary request/response protocol over TCP", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server, one worker per configured port
    Serve {
        /// Ports to listen on (overrides the config file; repeatable)
        #[arg(short, long)]
        port: Vec<u16>,

        /// Interface to bind to
        #[arg(short, long)]
        bind: Option<String>,

        /// Keep accepting connections after the first one ends
        #[arg(long)]
        accept_loop: bool,
    },

    /// Send requests to a running server and print the replies
    Send {
        /// Server address (host:port, or host with the default port)
        #[arg(short, long)]
        server: String,

        /// Request uri: time, random, name, or a number (0x prefix for hex)
        #[arg(short, long, default_value = "time")]
        uri: String,

        /// How many requests to send
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = if cli.verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    match &config.general.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    match cli.command {
        Commands::Serve {
            port,
            bind,
            accept_loop,
        } => {
            run_serve(config, port, bind, accept_loop).await?;
        }
        Commands::Send { server, uri, count } => {
            run_send(server, &uri, count).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Run the server: one independent listener task per configured port
async fn run_serve(
    mut config: Config,
    ports: Vec<u16>,
    bind: Option<String>,
    accept_loop: bool,
) -> anyhow::Result<()> {
    if !ports.is_empty() {
        config.network.ports = ports;
    }
    if let Some(bind) = bind {
        config.network.bind_address = bind;
    }
    if accept_loop {
        config.network.accept_mode = AcceptMode::Loop;
    }

    tracing::info!(
        "Starting WordWire server '{}' on ports {:?}",
        config.general.name,
        config.network.ports
    );

    let dispatcher = Arc::new(StandardDispatcher::new());
    let mut workers = JoinSet::new();

    for listener_config in config.listener_configs() {
        let port = listener_config.port;
        let listener = Listener::new(listener_config, dispatcher.clone());
        workers.spawn(async move { (port, listener.run().await) });
    }

    println!("========================================");
    println!("  WordWire Server Running");
    println!("========================================");
    println!("  Name:  {}", config.general.name);
    println!("  Bind:  {}", config.network.bind_address);
    println!("  Ports: {:?}", config.network.ports);
    println!("========================================");
    println!("\nPress Ctrl+C to stop.\n");

    loop {
        tokio::select! {
            joined = workers.join_next() => {
                match joined {
                    Some(Ok((port, Ok(())))) => {
                        tracing::info!("Worker for port {} finished", port);
                    }
                    Some(Ok((port, Err(e)))) => {
                        tracing::error!("Worker for port {} failed: {}", port, e);
                    }
                    Some(Err(e)) => {
                        tracing::error!("Worker task panicked: {}", e);
                    }
                    None => {
                        tracing::info!("All workers finished");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                workers.shutdown().await;
                break;
            }
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Send `count` requests to a server and print each exchange
async fn run_send(server: String, uri: &str, count: u32) -> anyhow::Result<()> {
    let addr: SocketAddr = if server.contains(':') {
        server.parse()?
    } else {
        format!("{}:{}", server, protocol::DEFAULT_PORT).parse()?
    };

    let uri = parse_uri(uri)?;

    println!("Connecting to {}...", addr);
    let mut client = ProbeClient::connect(addr).await?;

    for i in 1..=count {
        let exchange = client.send_request(uri).await?;
        println!(
            "[{}/{}] confirm id {} | response id {} data {:#018x}",
            i, count, exchange.confirm_id, exchange.response_id, exchange.data
        );
    }

    Ok(())
}

/// Parse a uri argument: a well-known name or a decimal/hex number
fn parse_uri(arg: &str) -> anyhow::Result<u64> {
    let uri = match arg {
        "time" => URI_GET_TIME,
        "random" => URI_GET_RANDOM_NUMBER,
        "name" => URI_GET_SERVER_NAME,
        other => {
            if let Some(hex) = other.strip_prefix("0x") {
                u64::from_str_radix(hex, 16)?
            } else {
                other.parse()?
            }
        }
    };
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["wordwire", "serve", "-p", "7000", "-p", "7001"]);
        assert!(cli.is_ok());

        let cli = Cli::try_parse_from(["wordwire", "send", "--server", "127.0.0.1:6464"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_parse_uri() {
        assert_eq!(parse_uri("time").unwrap(), URI_GET_TIME);
        assert_eq!(parse_uri("name").unwrap(), URI_GET_SERVER_NAME);
        assert_eq!(parse_uri("42").unwrap(), 42);
        assert_eq!(parse_uri("0x2a").unwrap(), 42);
        assert!(parse_uri("bogus").is_err());
    }
}
