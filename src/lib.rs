//! Relays bytes between two established connections under an idle timeout.
//!
//! ```no_run
//! # async fn relay(client: tokio::net::TcpStream, upstream: tokio::net::TcpStream) {
//! use ctunnel::{open_tunnel, TunnelConn};
//! use std::time::Duration;
//!
//! let res = open_tunnel(
//!     TunnelConn::new(client),
//!     TunnelConn::new(upstream),
//!     Duration::from_secs(60),
//! )
//! .await;
//! # }
//! ```
pub mod tunnel;
pub mod utils;

pub use tunnel::{open_tunnel, Direction, Tunnel};
pub use utils::{
    copy_one_way, BufferPool, ConnCloser, ConnReader, ConnWriter, Connection, Deadline,
    PooledBuf, TunnelConn, TunnelError,
};
