use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use resp_shard_proxy::errors::ProxyError;
use resp_shard_proxy::logging::{init_tracing, Must};
use resp_shard_proxy::session::run_session;
use resp_shard_proxy::topology::Topology;

/// A RESP replication-filtering proxy: sits between a primary and one
/// downstream replica, forwarding only the slice of the keyspace owned by
/// that replica under a consistent-hash topology.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Master Redis host.
    #[arg(long, default_value = "localhost")]
    master_host: String,

    /// Master Redis port.
    #[arg(long, default_value_t = 6379)]
    master_port: u16,

    /// Proxy listening interface, waiting for the replica to connect.
    #[arg(long, default_value = "")]
    proxy_host: String,

    /// Proxy port waiting for the replica to connect.
    #[arg(long, default_value_t = 6380)]
    proxy_port: u16,

    /// Replica (downstream) host: identifies this proxy's shard.
    #[arg(long, default_value = "")]
    slave_host: String,

    /// Replica (downstream) port.
    #[arg(long, default_value_t = 6381)]
    slave_port: u16,

    /// Comma-separated host:port list defining the shard topology, e.g.
    /// "host1:port1,host2:port2,host3:port3".
    topology: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let slave_host_port = format!("{}:{}", cli.slave_host, cli.slave_port);
    let master_addr = format!("{}:{}", cli.master_host, cli.master_port);
    let proxy_addr = format!("{}:{}", cli.proxy_host, cli.proxy_port);

    tracing::info!(master = %master_addr, "configured upstream master");
    tracing::info!(proxy = %proxy_addr, "configured proxy listening address");
    tracing::info!(slave = %slave_host_port, "configured downstream identity");
    tracing::info!(topology = %cli.topology, "configured shard topology");

    let topology = Topology::load(&cli.topology, slave_host_port)
        .or_bail("failed to parse shard topology");
    let topology = Arc::new(topology);

    let listener = TcpListener::bind(&proxy_addr)
        .await
        .map_err(ProxyError::from)
        .or_bail("failed to bind proxy listener");

    loop {
        match listener.accept().await {
            Ok((socket, peer_addr)) => {
                let topology = topology.clone();
                let master_addr = master_addr.clone();
                tokio::spawn(async move {
                    run_session(socket, peer_addr, master_addr, topology).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept incoming connection");
            }
        }
    }
}
