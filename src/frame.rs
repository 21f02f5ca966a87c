/*!
    wire format of packets

    every field is one byte, in this order

    - header: packet [Kind] in the low nibble, sequence number in the high nibble
    - ports: source port in the high nibble, destination port in the low nibble. Only present when port addressing is enabled on both sides
    - length: payload size, only present for [Kind::SendBlock] and [Kind::BroadcastBlock]
    - payload
    - checksum: chosen by the sender so that the sum of all bytes of the packet, checksum included, is 255

    there is no terminator, framing relies on the lengths above, the checksum and timeouts on the receiving side.
*/

use bilge::prelude::*;
use packbytes::ToBytes;
use thiserror::Error;


/// biggest payload a packet can carry, limited by the length byte
pub const MAX_PAYLOAD: usize = 255;
/// biggest frame on the wire: header, ports, length, payload, checksum
pub const MAX_FRAME: usize = 3 + MAX_PAYLOAD + 1;
/// value the checksum of a valid packet sums to
pub const CHECKSUM_TARGET: u8 = 0xff;

/// bytes of an encoded packet
pub type Frame = heapless::Vec<u8, MAX_FRAME>;


/// implement packbytes serialization for one byte bilge bitfields
macro_rules! pack_bilge {
    ($t:ty) => {

        impl packbytes::ToBytes for $t {
            type Bytes = [u8; 1];

            fn to_le_bytes(self) -> Self::Bytes {
                [u8::from(self)]
            }
            fn to_be_bytes(self) -> Self::Bytes {
                [u8::from(self)]
            }
        }
        impl packbytes::FromBytes for $t {
            type Bytes = [u8; 1];

            fn from_le_bytes(bytes: Self::Bytes) -> Self {
                <$t>::from(bytes[0])
            }
            fn from_be_bytes(bytes: Self::Bytes) -> Self {
                <$t>::from(bytes[0])
            }
        }
    };
}

/// packet type, low nibble of the header
#[bitsize(4)]
#[derive(Copy, Clone, FromBits, Debug, PartialEq)]
pub enum Kind {
    /// directed packet without payload
    Send0 = 0,
    /// directed packet with 1 byte of payload
    Send1 = 1,
    /// directed packet with 2 bytes of payload
    Send2 = 2,
    /// directed packet with an explicit length byte
    SendBlock = 3,
    Broadcast0 = 4,
    Broadcast1 = 5,
    Broadcast2 = 6,
    BroadcastBlock = 7,
    /// directed packet received
    Ack = 8,
    /// directed packet must be transmitted again
    Resend = 9,
    /// receiver is alive but its buffer is still full
    Busy = 10,
    /// receiver has no sequence state for this port, restart from the sequence number carried
    Reset = 11,
    /// anything else, the receiver flushes its input when it meets one
    #[fallback]
    Invalid = 15,
}

impl Kind {
    /// kind to use for a data packet of the given payload size
    pub fn data(length: usize, broadcast: bool) -> Self {
        match (length, broadcast) {
            (0, false) => Self::Send0,
            (1, false) => Self::Send1,
            (2, false) => Self::Send2,
            (_, false) => Self::SendBlock,
            (0, true) => Self::Broadcast0,
            (1, true) => Self::Broadcast1,
            (2, true) => Self::Broadcast2,
            (_, true) => Self::BroadcastBlock,
        }
    }
    pub fn is_response(self) -> bool {
        matches!(self, Self::Ack | Self::Resend | Self::Busy | Self::Reset)
    }
    pub fn is_broadcast(self) -> bool {
        matches!(self, Self::Broadcast0 | Self::Broadcast1 | Self::Broadcast2 | Self::BroadcastBlock)
    }
    /// payload size implied by the kind, `None` when a length byte follows
    pub fn implied_length(self) -> Option<u8> {
        match self {
            Self::Send1 | Self::Broadcast1 => Some(1),
            Self::Send2 | Self::Broadcast2 => Some(2),
            Self::SendBlock | Self::BroadcastBlock => None,
            _ => Some(0),
        }
    }
}

/// first byte of every packet
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq)]
pub struct Header {
    pub kind: Kind,
    /// rolling counter of directed packets, meaningless for broadcasts
    pub sequence: u4,
}
pack_bilge!(Header);

/// port pair following the header when port addressing is enabled
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq)]
pub struct Ports {
    pub destination: u4,
    pub source: u4,
}
pack_bilge!(Ports);

impl Ports {
    /// ports of a response to a packet carrying these ports
    pub fn reply(self) -> Self {
        Self::new(self.source(), self.destination())
    }
}


/// incremental additive checksum
#[derive(Copy, Clone, Default, Debug, PartialEq)]
pub struct Checksum(u8);

impl Checksum {
    pub fn new() -> Self {Self(0)}
    pub fn push(&mut self, byte: u8) {
        self.0 = self.0.wrapping_add(byte);
    }
    pub fn extend(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }
    /// byte to append for the whole packet to sum to [CHECKSUM_TARGET]
    pub fn complement(&self) -> u8 {
        CHECKSUM_TARGET.wrapping_sub(self.0)
    }
    /// true when every byte of a packet, checksum included, has been pushed and sums as expected
    pub fn valid(&self) -> bool {
        self.0 == CHECKSUM_TARGET
    }
}


/// error when encoding or decoding a complete frame
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {0} bytes does not fit in a packet")]
    TooLong(usize),
    #[error("payload size does not match the packet kind")]
    Length,
    #[error("frame ends before its announced size")]
    Truncated,
    #[error("bytes follow the end of the frame")]
    Trailing,
    #[error("header {0:#04x} has an unknown packet kind")]
    Invalid(u8),
    #[error("checksum mismatch")]
    Checksum,
}


/// a packet, borrowing its payload
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Packet<'d> {
    pub header: Header,
    /// only set when port addressing is enabled
    pub ports: Option<Ports>,
    pub payload: &'d [u8],
}

impl Packet<'_> {
    /// serialize the packet and append its checksum
    pub fn encode(&self) -> Result<Frame, FrameError> {
        let size = self.payload.len();
        if size > MAX_PAYLOAD {
            return Err(FrameError::TooLong(size));
        }
        let kind = self.header.kind();
        if kind == Kind::Invalid {
            return Err(FrameError::Invalid(u8::from(self.header)));
        }
        let mut frame = Frame::new();
        frame.extend_from_slice(&self.header.to_be_bytes()).map_err(|_| FrameError::TooLong(size))?;
        if let Some(ports) = self.ports {
            frame.extend_from_slice(&ports.to_be_bytes()).map_err(|_| FrameError::TooLong(size))?;
        }
        match kind.implied_length() {
            Some(implied) => if usize::from(implied) != size {
                return Err(FrameError::Length);
            },
            // size was checked against MAX_PAYLOAD above
            None => frame.push(size as u8).map_err(|_| FrameError::TooLong(size))?,
        }
        frame.extend_from_slice(self.payload).map_err(|_| FrameError::TooLong(size))?;

        let mut checksum = Checksum::new();
        checksum.extend(&frame);
        frame.push(checksum.complement()).map_err(|_| FrameError::TooLong(size))?;
        Ok(frame)
    }
}

/**
    parse exactly one complete frame

    `addressed` tells whether a port byte follows the header. The incremental parser used on a live link is in the receive state machine, this is for already delimited frames.
*/
pub fn decode(bytes: &[u8], addressed: bool) -> Result<Packet<'_>, FrameError> {
    let (&first, mut rest) = bytes.split_first().ok_or(FrameError::Truncated)?;
    let header = Header::from(first);
    let kind = header.kind();
    if kind == Kind::Invalid {
        return Err(FrameError::Invalid(first));
    }
    let ports = if addressed {
        let (&byte, tail) = rest.split_first().ok_or(FrameError::Truncated)?;
        rest = tail;
        Some(Ports::from(byte))
    }
    else {None};
    let size = match kind.implied_length() {
        Some(implied) => usize::from(implied),
        None => {
            let (&byte, tail) = rest.split_first().ok_or(FrameError::Truncated)?;
            rest = tail;
            usize::from(byte)
        },
    };
    // payload and checksum byte
    if rest.len() < size + 1 {
        return Err(FrameError::Truncated);
    }
    if rest.len() > size + 1 {
        return Err(FrameError::Trailing);
    }
    let mut checksum = Checksum::new();
    checksum.extend(bytes);
    if !checksum.valid() {
        return Err(FrameError::Checksum);
    }
    Ok(Packet {header, ports, payload: &rest[.. size]})
}




#[cfg(test)]
mod tests {
    use super::*;

    fn header(kind: Kind, sequence: u8) -> Header {
        Header::new(kind, u4::new(sequence))
    }

    #[test]
    fn header_nibbles() {
        let header = header(Kind::SendBlock, 0xa);
        assert_eq!(u8::from(header), 0xa3);
        assert_eq!(Header::from(0x58).kind(), Kind::Ack);
        assert_eq!(Header::from(0x58).sequence(), u4::new(5));
        assert_eq!(Header::from(0x0e).kind(), Kind::Invalid);

        let ports = Ports::new(u4::new(2), u4::new(7));
        assert_eq!(u8::from(ports), 0x72);
        assert_eq!(u8::from(ports.reply()), 0x27);
    }

    #[test]
    fn short_payloads_have_no_length_byte() {
        for size in 0 .. 3 {
            let payload = [0x42; 2];
            let packet = Packet {
                header: header(Kind::data(size, false), 3),
                ports: None,
                payload: &payload[.. size],
            };
            let frame = packet.encode().unwrap();
            assert_eq!(frame.len(), 1 + size + 1);
            assert_eq!(frame[0] & 0x0f, size as u8);
        }
        let payload = [1, 2, 3];
        let frame = Packet {
            header: header(Kind::data(payload.len(), true), 0),
            ports: Some(Ports::new(u4::new(1), u4::new(4))),
            payload: &payload,
        }.encode().unwrap();
        assert_eq!(&frame[.. 3], &[0x07, 0x41, 3]);
        assert_eq!(&frame[3 .. 6], &payload);
    }

    #[test]
    fn frames_sum_to_target() {
        let payload: [u8; 40] = core::array::from_fn(|i| (i * 37) as u8);
        let frame = Packet {
            header: header(Kind::SendBlock, 9),
            ports: Some(Ports::new(u4::new(15), u4::new(0))),
            payload: &payload,
        }.encode().unwrap();
        let sum = frame.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte));
        assert_eq!(sum, CHECKSUM_TARGET);

        let decoded = decode(&frame, true).unwrap();
        assert_eq!(decoded.payload, &payload);
        assert_eq!(decoded.header, header(Kind::SendBlock, 9));
        assert_eq!(decoded.ports, Some(Ports::new(u4::new(15), u4::new(0))));
    }

    #[test]
    fn decode_rejects_damage() {
        let payload = [10, 20, 30, 40];
        let frame = Packet {
            header: header(Kind::SendBlock, 1),
            ports: None,
            payload: &payload,
        }.encode().unwrap();

        let mut corrupted = frame.clone();
        corrupted[3] ^= 0x10;
        assert_eq!(decode(&corrupted, false), Err(FrameError::Checksum));
        assert_eq!(decode(&frame[.. frame.len()-1], false), Err(FrameError::Truncated));
        let mut longer = frame.clone();
        longer.push(0).unwrap();
        assert_eq!(decode(&longer, false), Err(FrameError::Trailing));
        assert_eq!(decode(&[0x0c, 0xf3], false), Err(FrameError::Invalid(0x0c)));
    }

    #[test]
    fn encode_checks_sizes() {
        let payload = [0; MAX_PAYLOAD + 1];
        let packet = Packet {header: header(Kind::SendBlock, 0), ports: None, payload: &payload};
        assert_eq!(packet.encode(), Err(FrameError::TooLong(MAX_PAYLOAD + 1)));

        let packet = Packet {header: header(Kind::Send1, 0), ports: None, payload: &payload[.. 2]};
        assert_eq!(packet.encode(), Err(FrameError::Length));

        let packet = Packet {header: header(Kind::SendBlock, 0), ports: None, payload: &payload[.. MAX_PAYLOAD]};
        assert_eq!(packet.encode().unwrap().len(), 1 + 1 + MAX_PAYLOAD + 1);
    }
}
