mod buffers;
mod conn;
mod copy;
mod error;
mod macros;

pub use buffers::{BufferPool, PooledBuf, RELAY_BUFFER_SIZE};
pub use conn::{
    deadline_after, ConnCloser, ConnReader, ConnWriter, Connection, Deadline, TunnelConn,
};
pub use copy::copy_one_way;
pub use error::{closed_err, timeout_err, TunnelError};
