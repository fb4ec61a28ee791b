//! presence_aggregator - keep last-known board and presence state and serve it over HTTP.
//!
//! Sources post `/presence`; dashboards poll `GET /presence` and `GET /status`.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io;
use std::sync::{mpsc, Arc};

use presence_monitor::config::{AggregatorConfig, DEFAULT_BIND_IP, DEFAULT_BIND_PORT};
use presence_monitor::operator::prompt_line;
use presence_monitor::{AggregatorServer, StateStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve last-known presence and board state")]
struct Args {
    /// Local IP to bind.
    #[arg(long, env = "PRESENCE_BIND_IP")]
    ip: Option<String>,

    /// Local port to bind.
    #[arg(long, env = "PRESENCE_BIND_PORT")]
    port: Option<u16>,

    /// Never prompt; use configured values and defaults.
    #[arg(long)]
    no_prompt: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = AggregatorConfig::load()?;
    if let Some(ip) = &args.ip {
        config.bind_ip = ip.clone();
    }
    if let Some(port) = args.port {
        config.bind_port = port;
    }

    if !args.no_prompt {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        if args.ip.is_none() && config.bind_ip == DEFAULT_BIND_IP {
            config.bind_ip =
                prompt_line(&mut input, &mut output, "select local ip", Some(DEFAULT_BIND_IP))?;
        }
        if args.port.is_none() && config.bind_port == DEFAULT_BIND_PORT {
            let port = prompt_line(
                &mut input,
                &mut output,
                "select local port",
                Some(&DEFAULT_BIND_PORT.to_string()),
            )?;
            config.bind_port = port
                .parse()
                .map_err(|_| anyhow!("'{}' is not a valid port", port))?;
        }
    }

    let addr = config.bind_addr()?;
    let store = Arc::new(StateStore::new());
    let handle = AggregatorServer::new(addr.to_string(), store).spawn()?;
    log::info!("presence_aggregator listening on {}", handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("presence_aggregator waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping server...");
    let sources = handle.store().presence().len();
    handle.stop()?;
    log::info!("presence_aggregator stopped ({} sources seen)", sources);

    Ok(())
}
