/*!
    receive state machine

    bytes are consumed one at a time: header, ports, length, data, checksum, then back to header. A bad checksum drops the packet and waits for the next header. Unknown headers switch to flushing, which discards everything until the line stays idle for the flush timeout. This is how the receiver synchronizes again on packet boundaries.
*/

use log::*;

use crate::{
    frame::{Header, Ports, Kind, Checksum, MAX_PAYLOAD},
    timer::{Millis, Timer},
    };


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Header,
    Ports,
    Length,
    Data,
    Checksum,
    Flush,
}

/// a complete packet with a valid checksum, its payload stays in the [Receiver] until the next header
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Incoming {
    pub header: Header,
    pub ports: Option<Ports>,
}

/// something worth reporting after feeding a byte or time to the receiver
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Event {
    Packet(Incoming),
    /// checksum mismatch, packet dropped
    Corrupted,
    /// unknown header, now flushing
    Garbage,
    /// flush ended on an idle gap
    Flushed,
    /// partial packet dropped after staying idle
    Timeout,
}

pub struct Receiver {
    state: State,
    /// a port byte follows every header
    addressed: bool,
    receive_timeout: Millis,
    flush_timeout: Millis,
    header: Header,
    ports: Option<Ports>,
    length: usize,
    data: heapless::Vec<u8, MAX_PAYLOAD>,
    checksum: Checksum,
    timer: Timer,
}

impl Receiver {
    pub fn new(addressed: bool, receive_timeout: Millis, flush_timeout: Millis) -> Self {
        Self {
            state: State::Header,
            addressed,
            receive_timeout,
            flush_timeout,
            header: Header::from(0),
            ports: None,
            length: 0,
            data: heapless::Vec::new(),
            checksum: Checksum::new(),
            timer: Timer::new(),
        }
    }
    /// waiting for a header, no packet is in progress
    pub fn idle(&self) -> bool {
        self.state == State::Header
    }
    /// payload of the last complete packet
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// check the receive and flush timeouts
    pub fn expire(&mut self, now: Millis) -> Option<Event> {
        if !self.timer.expired(now)
            {return None}
        self.timer.cancel();
        match self.state {
            State::Header => None,
            State::Flush => {
                debug!("input flushed");
                self.state = State::Header;
                Some(Event::Flushed)
            },
            _ => {
                debug!("dropping partial packet {:?} after timeout", self.header);
                self.state = State::Header;
                Some(Event::Timeout)
            },
        }
    }

    /// consume one input byte
    pub fn push(&mut self, byte: u8, now: Millis) -> Option<Event> {
        match self.state {
            State::Flush => {
                trace!("flushing {:#04x}", byte);
                self.timer.arm(now, self.flush_timeout);
                None
            },
            State::Header => {
                self.header = Header::from(byte);
                let kind = self.header.kind();
                if kind == Kind::Invalid {
                    debug!("unknown header {:#04x}, flushing input", byte);
                    self.flush(now);
                    return Some(Event::Garbage);
                }
                self.checksum = Checksum::new();
                self.checksum.push(byte);
                self.ports = None;
                self.data.clear();
                self.length = kind.implied_length().map(usize::from).unwrap_or(0);
                self.state = if self.addressed {State::Ports} else {self.after_ports()};
                self.timer.arm(now, self.receive_timeout);
                None
            },
            State::Ports => {
                self.checksum.push(byte);
                self.ports = Some(Ports::from(byte));
                self.state = self.after_ports();
                self.timer.arm(now, self.receive_timeout);
                None
            },
            State::Length => {
                self.checksum.push(byte);
                self.length = usize::from(byte);
                self.state = self.after_length();
                self.timer.arm(now, self.receive_timeout);
                None
            },
            State::Data => {
                self.checksum.push(byte);
                // the length byte cannot announce more than the buffer capacity
                let _ = self.data.push(byte);
                if self.data.len() >= self.length {
                    self.state = State::Checksum;
                }
                self.timer.arm(now, self.receive_timeout);
                None
            },
            State::Checksum => {
                self.checksum.push(byte);
                if self.checksum.valid() {
                    trace!("received {:?} {:?} with {} bytes", self.header, self.ports, self.data.len());
                    self.state = State::Header;
                    self.timer.cancel();
                    Some(Event::Packet(Incoming {
                        header: self.header,
                        ports: self.ports,
                    }))
                }
                else {
                    debug!("checksum mismatch on {:?}, packet dropped", self.header);
                    self.state = State::Header;
                    self.timer.cancel();
                    Some(Event::Corrupted)
                }
            },
        }
    }

    fn after_ports(&self) -> State {
        match self.header.kind().implied_length() {
            None => State::Length,
            Some(_) => self.after_length(),
        }
    }
    fn after_length(&self) -> State {
        if self.length > 0 {State::Data} else {State::Checksum}
    }
    fn flush(&mut self, now: Millis) {
        self.state = State::Flush;
        self.timer.arm(now, self.flush_timeout);
    }
}
