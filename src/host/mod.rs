/*!
    drive a packet server from a `std` host, on a serial port, with tokio.

    The central resource is the [Host] struct, it owns the serial port and a [PacketServer](crate::PacketServer) running on an in-memory link, and moves bytes between both in [Host::pump].

    - for one-shot exchanges use [Host::deliver], [Host::broadcast] and [Host::receive]
    - for anything else, use [Host::server_mut] and call [Host::pump] repeatedly
*/

/// the link between the serial port and the server, and the exchanges on it
mod networking;

pub use networking::{Host, Buffered};


use thiserror::Error;

/// error regarding packet exchanges on a serial port
#[derive(Error, Debug)]
pub enum Error {
    #[error("problem with uart bus")]
    Bus(std::io::Error),
    #[error("packet refused by the server")]
    Rejected(crate::Error),
    #[error("packet not acknowledged")]
    Undelivered,
    #[error("no data arrived in expected time")]
    Timeout,
    #[error("unsupported line settings: {0}")]
    Settings(&'static str),
}
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Bus(error)
    }
}
impl From<crate::Error> for Error {
    fn from(error: crate::Error) -> Self {
        Self::Rejected(error)
    }
}

/// serial line parameters, 8 data bits and no parity
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineSettings {
    /// baud rate
    pub rate: u32,
    /// 1 or 2
    pub stop_bits: u8,
}
impl Default for LineSettings {
    fn default() -> Self {
        Self {
            rate: 9600,
            stop_bits: 1,
        }
    }
}
