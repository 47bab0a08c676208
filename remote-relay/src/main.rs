use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use remote_relay::{
    automation::detect_backend,
    cli::{Cli, Command},
    client,
    executor::Executor,
    server::Relay,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => {
            let backend = detect_backend(&args.browser);
            let executor = Executor::new(backend).with_open_enabled(!args.disable_open);
            info!(backend = executor.backend_name(), "automation backend selected");

            let config = args.relay_config();
            info!(transport = ?config.transport, "starting relay");
            let relay = Relay::bind(config, executor).await?;
            let addr = relay.local_addr()?;
            info!("relay listening on {}", addr);
            if let Err(err) = relay.run_until_ctrl_c().await {
                warn!("relay exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => client::run(args.into()).await?,
    }

    Ok(())
}
