mod args;
mod server;

use anyhow::Result;
use std::sync::Arc;
use structopt::StructOpt;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    let opt = args::Opt::from_args();
    let collector = tracing_subscriber::fmt()
        .with_max_level(opt.log_level)
        .finish();

    let _ = tracing::subscriber::set_global_default(collector);

    let listener = TcpListener::bind(&opt.listen_addr).await?;
    server::start_server(listener, tokio::signal::ctrl_c(), Arc::new(opt)).await
}
