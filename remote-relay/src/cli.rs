use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    client::ClientConfig,
    server::{OriginPolicy, RelayConfig, RelayOptions, Transport},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay and drive the local browser.
    Server(ServerArgs),
    /// Send commands typed at a prompt to a running relay.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Connection transport clients use.
    #[arg(long, value_enum, default_value_t = Transport::WebSocket)]
    pub transport: Transport,

    /// Serve files from this directory on every path except /ws.
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Extra browser origin allowed to open the WebSocket. Repeatable.
    #[arg(long = "allow-origin", value_name = "ORIGIN")]
    pub allowed_origins: Vec<String>,

    /// Accept WebSocket upgrades from any origin.
    #[arg(long)]
    pub any_origin: bool,

    /// Ignore `open` commands instead of opening URLs.
    #[arg(long)]
    pub disable_open: bool,

    /// Application that receives keystrokes and opened URLs.
    #[arg(long, default_value = "Google Chrome")]
    pub browser: String,

    /// Seconds to wait for open connections when shutting down.
    #[arg(long, default_value_t = 5)]
    pub grace_period_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Relay address in host:port form.
    #[arg(long, default_value = "localhost:8080")]
    pub server: String,

    /// Transport the relay is running. Matches the server default.
    #[arg(long, value_enum, default_value_t = Transport::WebSocket)]
    pub transport: Transport,
}

impl ServerArgs {
    pub fn relay_config(&self) -> RelayConfig {
        let policy = if self.any_origin {
            OriginPolicy::allow_any()
        } else {
            OriginPolicy::same_origin()
        };

        RelayConfig {
            listen: self.listen,
            transport: self.transport,
            options: RelayOptions {
                static_dir: self.static_dir.clone(),
                origin_policy: policy.with_allowed(self.allowed_origins.iter().cloned()),
                grace_period: Duration::from_secs(self.grace_period_secs),
            },
        }
    }
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        ClientConfig {
            server: args.server,
            transport: args.transport,
        }
    }
}
