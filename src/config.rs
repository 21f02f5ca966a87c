use crate::timer::Millis;


/// protocol settings of a [PacketServer](crate::PacketServer)
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Config {
    /// local port, packets then carry a port byte. `None` for point to point links without addressing
    pub port: Option<u8>,
    /// single line shared by both directions
    pub half_duplex: bool,
    /// total number of transmissions of a directed packet before giving up, 0 fails every directed send
    pub retries: u8,
    /// how long to wait for a response before retransmitting
    pub send_timeout: Millis,
    /// how long a partially received packet may stay idle before being dropped
    pub receive_timeout: Millis,
    /// idle gap ending a flush of garbage input
    pub flush_timeout: Millis,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: None,
            half_duplex: false,
            retries: 5,
            send_timeout: 100,
            receive_timeout: 50,
            flush_timeout: 10,
        }
    }
}

impl Config {
    pub fn with_port(mut self, port: u8) -> Self {
        self.port = Some(port);
        self
    }
    pub fn with_half_duplex(mut self, half_duplex: bool) -> Self {
        self.half_duplex = half_duplex;
        self
    }
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }
    pub fn with_send_timeout(mut self, timeout: Millis) -> Self {
        self.send_timeout = timeout;
        self
    }
    pub fn with_receive_timeout(mut self, timeout: Millis) -> Self {
        self.receive_timeout = timeout;
        self
    }
    pub fn with_flush_timeout(mut self, timeout: Millis) -> Self {
        self.flush_timeout = timeout;
        self
    }
}
