use crate::args::Opt;
use anyhow::Result;
use ctunnel::{open_tunnel, or_continue, TunnelConn};
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tracing::*;

lazy_static! {
    static ref CONNECTION_COUNTER: AtomicUsize = AtomicUsize::new(0);
}

async fn handle(inbound: TcpStream, options: Arc<Opt>) -> Result<()> {
    let conn_id = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
    let outbound = TcpStream::connect(&options.target_addr).await?;
    inbound.set_nodelay(true)?;
    outbound.set_nodelay(true)?;
    debug!("[tcp][{}]outbound connected: {:?}", conn_id, outbound);

    info!("[tcp][{}]start relaying", conn_id);
    open_tunnel(
        TunnelConn::new(inbound),
        TunnelConn::new(outbound),
        options.timeout,
    )
    .await?;
    info!("[tcp][{}]end relaying", conn_id);
    Ok(())
}

async fn run(listener: TcpListener, options: Arc<Opt>) -> Result<()> {
    loop {
        let (stream, peer) = or_continue!(listener.accept().await);
        trace!("accepted tcp: {:?}", peer);
        let options = options.clone();
        tokio::spawn(async move {
            if let Err(e) = handle(stream, options).await {
                info!("relaying for {} failed: {:#}", peer, e);
            }
        });
    }
}

pub async fn start_server(
    listener: TcpListener,
    ctrl_c: impl std::future::Future,
    options: Arc<Opt>,
) -> Result<()> {
    info!(
        "server-start, {} -> {}",
        listener.local_addr()?,
        options.target_addr
    );

    select! {
        _ = ctrl_c => {
            info!("ctrl-c");
        }
        res = run(listener, options) => {
            res?;
        }
    }
    Ok(())
}
