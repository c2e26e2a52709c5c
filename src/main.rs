mod broker;
mod cli;
mod client;
mod host;
mod ipc;
mod layout;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Broker {
            socket,
            virtual_screen,
            disable_x11,
        } => {
            let config = broker::state::BrokerConfig {
                virtual_screen,
                x11_enabled: !disable_x11,
            };
            if let Err(e) = broker::run(config, socket).await {
                tracing::error!(error = %e, "broker failed");
                eprintln!("x11hostd broker: {e}");
                std::process::exit(1);
            }
        }
        Command::Client {
            socket,
            display,
            action,
        } => {
            if let Err(e) = client::run(socket, display, action).await {
                tracing::error!(error = %e, "client failed");
                eprintln!("x11hostd client: {e}");
                std::process::exit(1);
            }
        }
    }
}
