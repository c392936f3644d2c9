use std::net::{IpAddr, SocketAddr};

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a relay server, accepting client and peer-server connections.
    Serve(ServeArgs),
    /// Connect to a relay and exchange messages under a username.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(long, default_value_t = 30000)]
    pub port: u16,

    /// Host this relay advertises to peers, and the host seed ports are
    /// dialed on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Candidate peer ports to federate with at startup.
    #[arg(long, value_delimiter = ',')]
    pub seed_ports: Vec<u16>,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Username to register with the relay.
    #[arg(long)]
    pub username: String,

    /// Address of the relay to connect to.
    #[arg(long, default_value = "127.0.0.1:30000")]
    pub server: SocketAddr,
}
