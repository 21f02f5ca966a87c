use bilge::prelude::*;

use crate::frame::{Header, Ports, Kind, Packet, Frame, FrameError, MAX_PAYLOAD};


/// where the outbound packet is in its life
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// waiting for the line to be transmitted
    Queued,
    /// bytes are being handed to the link
    Transmitting,
    /// transmitted, waiting for a response or the send timeout
    AwaitingAck,
}

/// the only packet in flight
#[derive(Clone, Debug)]
pub struct Outbound {
    pub payload: heapless::Vec<u8, MAX_PAYLOAD>,
    pub source: u4,
    pub destination: u4,
    pub sequence: u4,
    pub broadcast: bool,
    /// transmissions started so far
    pub attempts: u8,
    pub phase: Phase,
}

impl Outbound {
    /// bytes of the packet as it must go on the wire now
    pub fn encode(&self, addressed: bool) -> Result<Frame, FrameError> {
        Packet {
            header: Header::new(Kind::data(self.payload.len(), self.broadcast), self.sequence),
            ports: addressed.then(|| Ports::new(self.destination, self.source)),
            payload: &self.payload,
        }.encode()
    }
    /// whether a response with these ports answers this packet
    pub fn answered_by(&self, ports: Option<Ports>) -> bool {
        match ports {
            Some(ports) => ports.source() == self.destination && ports.destination() == self.source,
            None => true,
        }
    }
}

/// a response waiting to be transmitted
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Response {
    pub header: Header,
    pub ports: Option<Ports>,
}

impl Response {
    pub fn encode(&self) -> Result<Frame, FrameError> {
        Packet {
            header: self.header,
            ports: self.ports,
            payload: &[],
        }.encode()
    }
}

/// what the bytes currently handed to the link belong to
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Purpose {
    Data,
    Response,
}

/// a frame being written to the link
#[derive(Clone, Debug)]
pub struct Transmission {
    pub frame: Frame,
    /// bytes already accepted by the link
    pub written: usize,
    pub purpose: Purpose,
}

impl Transmission {
    pub fn new(frame: Frame, purpose: Purpose) -> Self {
        Self {frame, written: 0, purpose}
    }
    pub fn remaining(&self) -> &[u8] {
        &self.frame[self.written ..]
    }
    pub fn done(&self) -> bool {
        self.written >= self.frame.len()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::decode;

    #[test]
    fn outbound_frames() {
        let outbound = Outbound {
            payload: heapless::Vec::from_slice(&[5, 6, 7]).unwrap(),
            source: u4::new(2),
            destination: u4::new(11),
            sequence: u4::new(4),
            broadcast: false,
            attempts: 0,
            phase: Phase::Queued,
        };
        let frame = outbound.encode(true).unwrap();
        let packet = decode(&frame, true).unwrap();
        assert_eq!(packet.header.kind(), Kind::SendBlock);
        assert_eq!(packet.header.sequence(), u4::new(4));
        assert_eq!(packet.payload, &[5, 6, 7]);

        let reply = packet.ports.unwrap().reply();
        assert!(outbound.answered_by(Some(reply)));
        assert!(!outbound.answered_by(packet.ports));
        assert!(outbound.answered_by(None));

        let frame = outbound.encode(false).unwrap();
        assert_eq!(frame.len(), 1 + 1 + 3 + 1);
    }

    #[test]
    fn transmission_progress() {
        let response = Response {
            header: Header::new(Kind::Ack, u4::new(1)),
            ports: None,
        };
        let mut transmission = Transmission::new(response.encode().unwrap(), Purpose::Response);
        assert_eq!(transmission.remaining(), &[0x18, 0xe7]);
        transmission.written += 2;
        assert!(transmission.done());
    }
}
