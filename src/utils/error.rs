use std::io::{Error, ErrorKind};

#[derive(Debug, err_derive::Error)]
pub enum TunnelError {
    #[error(display = "i/o timeout")]
    Timeout,
    #[error(display = "short write")]
    ShortWrite,
    #[error(display = "transport error: {}", _0)]
    Transport(#[error(source)] Error),
}

impl TunnelError {
    /// Classifies an I/O failure; deadline expiry is reported as `Timeout`.
    pub fn from_io(e: Error) -> Self {
        match e.kind() {
            ErrorKind::TimedOut => TunnelError::Timeout,
            _ => TunnelError::Transport(e),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TunnelError::Timeout)
    }
}

pub fn timeout_err() -> Error {
    Error::new(ErrorKind::TimedOut, "i/o timeout")
}

pub fn closed_err() -> Error {
    Error::new(ErrorKind::NotConnected, "use of closed connection")
}
