use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use relay_mesh::{
    cli::{Cli, Command},
    client,
    relay::Relay,
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
        Command::Serve(args) => {
            let relay = Relay::bind(args.host, args.port).await?;
            info!("relay listening on {}", relay.local_addr()?);

            let peers = relay.bootstrap(&args.seed_ports).await;
            if peers == 0 {
                info!("no peers reachable, running standalone");
            } else {
                info!(peers, "federation bootstrap complete");
            }

            if let Err(err) = relay.run_until_ctrl_c().await {
                warn!("relay exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
