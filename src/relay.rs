use std::{
    future::Future,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{
    bootstrap,
    directory::{Directory, PeerId},
    session,
};

/// A federated relay server: listener, shared directory, and own identity.
pub struct Relay {
    listener: TcpListener,
    directory: Arc<Directory>,
    identity: PeerId,
}

impl Relay {
    /// Binds `0.0.0.0:port` and fixes Own Identity as `host` plus the
    /// actually-bound port, so an ephemeral port 0 works in tests.
    pub async fn bind(host: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await?;
        let bound_port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            directory: Arc::new(Directory::new()),
            identity: PeerId::new(host, bound_port),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn identity(&self) -> PeerId {
        self.identity
    }

    /// Dials the seed ports and federates; returns the number of outbound
    /// peer connections established. Zero peers is legal; the relay then
    /// serves only local clients.
    pub async fn bootstrap(&self, seed_ports: &[u16]) -> usize {
        bootstrap::run(&self.directory, self.identity, seed_ports).await
    }

    /// Accept loop; future peer and client connections are indistinguishable
    /// until their registration frame arrives.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Relay {
            listener,
            directory,
            identity,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("relay shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    handle_accept_result(accepted, &directory, identity);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: io::Result<(TcpStream, SocketAddr)>,
    directory: &Arc<Directory>,
    identity: PeerId,
) {
    match result {
        Ok((stream, remote)) => {
            info!(peer = %remote, "connection established");
            session::spawn_inbound(stream, remote, Arc::clone(directory), identity);
        }
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}
