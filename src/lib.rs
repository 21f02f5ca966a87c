/*!
    reliable packet transport over a raw serial link

    packets are framed with a one byte header (kind and sequence number), an optional port byte, an optional length byte, the payload and an additive checksum. Directed packets are acknowledged and retransmitted on timeout, broadcasts are not.

    everything is driven by [PacketServer::poll] which must be called repeatedly, there is no interrupt nor background task.
*/
#![no_std]
#[cfg(any(test, feature = "std"))]
extern crate std;

use thiserror::Error;

pub mod frame;
pub mod sequence;
pub mod timer;
pub mod link;
pub mod config;
mod receive;
mod send;
mod server;

#[cfg(any(test, feature = "std"))]
pub mod loopback;
#[cfg(feature = "embedded")]
pub mod embedded;
#[cfg(feature = "host")]
pub mod host;


pub use config::Config;
pub use link::{Link, Direction};
pub use timer::{Clock, Millis};
pub use server::{PacketServer, Message, Statistics};


/// error returned when an operation cannot be accepted by a [PacketServer]
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// a previous send is still waiting for its acknowledgement
    #[error("a send is already pending")]
    Busy,
    /// payload does not fit in a packet
    #[error("payload of {0} bytes exceeds the packet capacity")]
    TooLong(usize),
    /// ports are 4 bits wide
    #[error("port {0} is out of range")]
    InvalidPort(u8),
    /// ports were given to a server running without port addressing
    #[error("port addressing is disabled")]
    Unaddressed,
}
