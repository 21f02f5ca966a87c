use core::{
    mem,
    ops::Deref,
    };
use bilge::prelude::*;
use packbytes::{FromBytes, ToBytes};
use log::*;

use crate::{
    Error,
    config::Config,
    frame::{Header, Ports, Kind, MAX_PAYLOAD},
    sequence::{self, SequenceTable, Verdict, PORTS},
    timer::{Clock, Millis, Timer},
    link::{Link, Direction},
    receive::{Receiver, Incoming, Event},
    send::{Outbound, Phase, Response, Purpose, Transmission},
    };


/**
    buffer receiving the payload of one packet

    once filled it stays full until the caller gets it back, see [PacketServer::take_message] and [PacketServer::set_receive_buffer]
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    data: heapless::Vec<u8, MAX_PAYLOAD>,
    full: bool,
    source: u8,
    destination: u8,
    broadcast: bool,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }
    /// a payload was delivered and not consumed yet
    pub fn is_full(&self) -> bool {self.full}
    pub fn data(&self) -> &[u8] {&self.data}
    /// port the packet was sent from, 0 without port addressing
    pub fn source(&self) -> u8 {self.source}
    /// port the packet was sent to, 0 without port addressing
    pub fn destination(&self) -> u8 {self.destination}
    pub fn is_broadcast(&self) -> bool {self.broadcast}
    /// make the buffer available again
    pub fn clear(&mut self) {
        self.data.clear();
        self.full = false;
    }

    fn fill(&mut self, payload: &[u8], source: u4, destination: u4, broadcast: bool) {
        self.data.clear();
        // payloads never exceed the capacity, the length byte is the limit
        let _ = self.data.extend_from_slice(payload);
        self.full = true;
        self.source = source.value();
        self.destination = destination.value();
        self.broadcast = broadcast;
    }
}

impl Deref for Message {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.data
    }
}


/// counters of protocol events the server recovered from silently
#[derive(Copy, Clone, Debug, Default, PartialEq, FromBytes, ToBytes)]
pub struct Statistics {
    /// packets dropped because of a checksum mismatch
    pub checksum_errors: u16,
    /// flushes started on an unknown header
    pub flushes: u16,
    /// partial packets dropped after staying idle
    pub timeouts: u16,
    /// directed packets transmitted again
    pub retransmissions: u16,
    /// retransmissions of packets already delivered
    pub duplicates: u16,
    /// valid packets that could not be delivered for lack of buffer
    pub dropped: u16,
}

fn count(counter: &mut u16) {
    *counter = counter.saturating_add(1);
}

fn checked_port(port: u8) -> Result<u4, Error> {
    if usize::from(port) < PORTS
        {Ok(u4::new(port))}
    else
        {Err(Error::InvalidPort(port))}
}


/**
    reliable packet transport over a [Link]

    at most one packet is in flight in each direction: one outbound packet waiting for its acknowledgement, and one receive buffer waiting for the caller to consume it.

    nothing happens unless [Self::poll] is called, and it must be called often enough for the timeouts in [Config] to be meaningful.
*/
pub struct PacketServer<L, C> {
    link: L,
    clock: C,
    config: Config,
    /// local port, `None` without port addressing
    port: Option<u4>,
    /// bit per destination port this server accepts packets for
    listening: u16,

    receiver: Receiver,
    /// expected sequence number of incoming packets, per local port
    incoming: SequenceTable,
    /// sequence number of the next directed packet, per destination port
    outgoing: [u4; PORTS],

    outbound: Option<Outbound>,
    response: Option<Response>,
    transmission: Option<Transmission>,
    send_timer: Timer,
    direction: Direction,

    buffer: Option<Message>,
    sent: bool,
    error: bool,
    last_source: u4,
    last_destination: u4,
    last_broadcast: bool,
    statistics: Statistics,
}

impl<L: Link, C: Clock> PacketServer<L, C> {
    pub fn new(link: L, clock: C, config: Config) -> Result<Self, Error> {
        let port = config.port.map(checked_port).transpose()?;
        Ok(Self {
            link,
            clock,
            config,
            port,
            listening: port.map(|port| 1 << port.value()).unwrap_or(0),
            receiver: Receiver::new(port.is_some(), config.receive_timeout, config.flush_timeout),
            incoming: SequenceTable::new(),
            outgoing: [u4::new(0); PORTS],
            outbound: None,
            response: None,
            transmission: None,
            send_timer: Timer::new(),
            // the first poll puts a half-duplex line in receive direction
            direction: Direction::Transmit,
            buffer: None,
            sent: true,
            error: false,
            last_source: u4::new(0),
            last_destination: u4::new(0),
            last_broadcast: false,
            statistics: Statistics::default(),
        })
    }

    pub fn config(&self) -> &Config {&self.config}
    pub fn link(&self) -> &L {&self.link}
    pub fn link_mut(&mut self) -> &mut L {&mut self.link}
    pub fn clock(&self) -> &C {&self.clock}
    pub fn statistics(&self) -> Statistics {self.statistics}
    /// return the counters and restart them from zero
    pub fn reset_statistics(&mut self) -> Statistics {
        mem::take(&mut self.statistics)
    }

    /// send to the local port number
    pub fn send(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.submit(None, None, payload, false)
    }
    /// send from the local port number
    pub fn send_to(&mut self, destination: u8, payload: &[u8]) -> Result<(), Error> {
        self.submit(None, Some(destination), payload, false)
    }
    pub fn send_from(&mut self, source: u8, destination: u8, payload: &[u8]) -> Result<(), Error> {
        self.submit(Some(source), Some(destination), payload, false)
    }
    /// same as [Self::send] without acknowledgement
    pub fn broadcast(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.submit(None, None, payload, true)
    }
    pub fn broadcast_to(&mut self, destination: u8, payload: &[u8]) -> Result<(), Error> {
        self.submit(None, Some(destination), payload, true)
    }
    pub fn broadcast_from(&mut self, source: u8, destination: u8, payload: &[u8]) -> Result<(), Error> {
        self.submit(Some(source), Some(destination), payload, true)
    }

    /// give up the pending send, it will be reported as failed
    pub fn abort_send(&mut self) {
        if let Some(outbound) = &self.outbound {
            warn!("aborting send of packet {}", outbound.sequence.value());
            self.finish_send(false);
        }
    }
    /// the last send is over, successfully or not. True when nothing was sent yet
    pub fn buffer_sent(&self) -> bool {self.sent}
    /// the last send is over and failed
    pub fn send_error(&self) -> bool {self.sent && self.error}

    /**
        replace the receive buffer, returning the previous one

        without buffer, incoming packets are still consumed but not delivered. Directed packets are then answered with a resend request
    */
    pub fn set_receive_buffer(&mut self, buffer: Option<Message>) -> Option<Message> {
        mem::replace(&mut self.buffer, buffer)
    }
    pub fn receive_buffer(&self) -> Option<&Message> {
        self.buffer.as_ref()
    }
    pub fn receive_buffer_full(&self) -> bool {
        self.buffer.as_ref().is_some_and(Message::is_full)
    }
    /// take the filled receive buffer, leaving an empty one in its place
    pub fn take_message(&mut self) -> Option<Message> {
        if !self.receive_buffer_full()
            {return None}
        self.buffer.replace(Message::new())
    }
    /// whether the last delivered packet was a broadcast
    pub fn received_broadcast(&self) -> bool {self.last_broadcast}
    /// source port of the last delivered packet
    pub fn source_port(&self) -> u8 {self.last_source.value()}
    /// destination port of the last delivered packet
    pub fn destination_port(&self) -> u8 {self.last_destination.value()}

    /// also accept packets sent to this port
    pub fn listen(&mut self, port: u8) -> Result<(), Error> {
        if self.port.is_none()
            {return Err(Error::Unaddressed)}
        let port = checked_port(port)?;
        self.listening |= 1 << port.value();
        Ok(())
    }
    /// stop accepting packets sent to this port, its sequence state is forgotten
    pub fn ignore(&mut self, port: u8) -> Result<(), Error> {
        if self.port.is_none()
            {return Err(Error::Unaddressed)}
        let port = checked_port(port)?;
        self.listening &= !(1 << port.value());
        self.incoming.forget(port);
        Ok(())
    }
    /// whether packets to this port are accepted, always true without port addressing
    pub fn listening(&self, port: u8) -> bool {
        checked_port(port).is_ok_and(|port| self.listens(port))
    }

    /**
        advance the protocol

        - complete the current transmission once drained, and give a half-duplex line back to reception
        - consume every available input byte
        - retransmit on send timeout
        - start transmitting the next response or packet, unless a half-duplex line is busy receiving
    */
    pub fn poll(&mut self) -> Result<(), L::Error> {
        let now = self.clock.now();
        self.complete_transmission(now)?;

        if let Some(event) = self.receiver.expire(now) {
            self.record(event, now);
        }
        while let Some(byte) = self.link.read()? {
            if let Some(event) = self.receiver.push(byte, now) {
                self.record(event, now);
            }
        }

        if self.send_timer.expired(now) {
            self.send_timer.cancel();
            debug!("no response in time");
            self.retry();
        }

        self.transmit()?;
        self.complete_transmission(now)?;
        Ok(())
    }

    fn submit(&mut self, source: Option<u8>, destination: Option<u8>, payload: &[u8], broadcast: bool) -> Result<(), Error> {
        if self.outbound.is_some()
            {return Err(Error::Busy)}
        let local = self.local_port();
        let (source, destination) = match self.port {
            Some(_) => (
                source.map(checked_port).transpose()?.unwrap_or(local),
                destination.map(checked_port).transpose()?.unwrap_or(local),
                ),
            None => {
                if source.is_some() || destination.is_some()
                    {return Err(Error::Unaddressed)}
                (local, local)
            },
        };
        let payload = heapless::Vec::from_slice(payload)
            .map_err(|_| Error::TooLong(payload.len()))?;
        let sequence = if broadcast {u4::new(0)} else {self.outgoing[usize::from(destination.value())]};
        debug!("queuing {} bytes from port {} to port {}, broadcast {}",
            payload.len(), source.value(), destination.value(), broadcast);
        self.outbound = Some(Outbound {
            payload,
            source,
            destination,
            sequence,
            broadcast,
            attempts: 0,
            phase: Phase::Queued,
        });
        self.sent = false;
        self.error = false;
        Ok(())
    }

    fn finish_send(&mut self, delivered: bool) {
        self.outbound = None;
        self.send_timer.cancel();
        self.sent = true;
        self.error = !delivered;
    }

    /// transmit the outbound packet again if attempts remain, fail otherwise
    fn retry(&mut self) {
        self.send_timer.cancel();
        let Some(outbound) = self.outbound.as_mut()
            else {return};
        if outbound.attempts < self.config.retries {
            outbound.phase = Phase::Queued;
            count(&mut self.statistics.retransmissions);
        }
        else {
            warn!("packet {} undelivered after {} attempts", outbound.sequence.value(), outbound.attempts);
            self.finish_send(false);
        }
    }

    fn local_port(&self) -> u4 {
        self.port.unwrap_or(u4::new(0))
    }
    fn listens(&self, port: u4) -> bool {
        self.port.is_none() || self.listening & (1 << port.value()) != 0
    }

    fn record(&mut self, event: Event, now: Millis) {
        match event {
            Event::Packet(incoming) => {
                if incoming.header.kind().is_response()
                    {self.on_response(incoming, now)}
                else
                    {self.on_data(incoming)}
            },
            Event::Corrupted => count(&mut self.statistics.checksum_errors),
            Event::Garbage => count(&mut self.statistics.flushes),
            Event::Timeout => count(&mut self.statistics.timeouts),
            Event::Flushed => {},
        }
    }

    fn on_response(&mut self, incoming: Incoming, now: Millis) {
        let kind = incoming.header.kind();
        let sequence = incoming.header.sequence();
        let Some(outbound) = self.outbound.as_mut() else {
            trace!("ignoring {:?} while nothing is pending", kind);
            return
        };
        if outbound.phase != Phase::AwaitingAck || !outbound.answered_by(incoming.ports) {
            trace!("ignoring {:?} not answering the pending packet", kind);
            return
        }
        if kind != Kind::Reset && sequence != outbound.sequence {
            debug!("ignoring stale {:?} for packet {}", kind, sequence.value());
            return
        }
        let destination = usize::from(outbound.destination.value());
        match kind {
            Kind::Ack => {
                debug!("packet {} acknowledged", sequence.value());
                self.outgoing[destination] = sequence::next(sequence);
                self.finish_send(true);
            },
            Kind::Resend => {
                debug!("packet {} must be sent again", sequence.value());
                self.retry();
            },
            Kind::Busy => {
                debug!("receiver busy, waiting");
                self.send_timer.arm(now, self.config.send_timeout);
            },
            Kind::Reset => {
                debug!("receiver reset, restarting from packet {}", sequence.value());
                outbound.sequence = sequence;
                self.outgoing[destination] = sequence;
                self.retry();
            },
            _ => {},
        }
    }

    fn on_data(&mut self, incoming: Incoming) {
        let header = incoming.header;
        let local = self.local_port();
        let (source, destination) = incoming.ports
            .map(|ports| (ports.source(), ports.destination()))
            .unwrap_or((local, local));
        if !self.listens(destination) {
            trace!("ignoring packet for port {}", destination.value());
            return
        }

        if header.kind().is_broadcast() {
            if !self.deliver(source, destination, true) {
                debug!("no free buffer, broadcast dropped");
                count(&mut self.statistics.dropped);
            }
            return
        }

        let sequence = header.sequence();
        let reply = match self.incoming.check(destination, sequence) {
            Verdict::Expected => match self.buffer.as_ref().map(Message::is_full) {
                Some(false) => {
                    self.deliver(source, destination, false);
                    self.incoming.advance(destination);
                    Kind::Ack
                },
                Some(true) => Kind::Busy,
                None => {
                    count(&mut self.statistics.dropped);
                    Kind::Resend
                },
            },
            Verdict::Duplicate => {
                debug!("packet {} received twice", sequence.value());
                count(&mut self.statistics.duplicates);
                Kind::Ack
            },
            Verdict::Unsynchronized => {
                debug!("first packet on port {}, asking for a reset", destination.value());
                self.response = Some(Response {
                    header: Header::new(Kind::Reset, self.incoming.expected(destination)),
                    ports: incoming.ports.map(Ports::reply),
                });
                return
            },
            Verdict::Mismatch => {
                debug!("packet {} out of sequence, expected {}", sequence.value(), self.incoming.expected(destination).value());
                Kind::Resend
            },
        };
        self.response = Some(Response {
            header: Header::new(reply, sequence),
            ports: incoming.ports.map(Ports::reply),
        });
    }

    fn deliver(&mut self, source: u4, destination: u4, broadcast: bool) -> bool {
        let Some(buffer) = self.buffer.as_mut()
            else {return false};
        if buffer.is_full()
            {return false}
        buffer.fill(self.receiver.payload(), source, destination, broadcast);
        self.last_source = source;
        self.last_destination = destination;
        self.last_broadcast = broadcast;
        debug!("delivered {} bytes from port {}", buffer.len(), source.value());
        true
    }

    /// start the next transmission if the line allows it, and hand as many bytes as possible to the link
    fn transmit(&mut self) -> Result<(), L::Error> {
        if self.transmission.is_none() && (!self.config.half_duplex || self.receiver.idle()) {
            self.transmission = self.next_transmission();
            if self.transmission.is_some() && self.config.half_duplex && self.direction != Direction::Transmit {
                self.link.set_direction(Direction::Transmit)?;
                self.direction = Direction::Transmit;
            }
        }
        if let Some(transmission) = self.transmission.as_mut() {
            while let Some(&byte) = transmission.remaining().first() {
                if !self.link.write(byte)?
                    {break}
                transmission.written += 1;
            }
        }
        Ok(())
    }

    /// responses go before data
    fn next_transmission(&mut self) -> Option<Transmission> {
        if let Some(response) = self.response.take() {
            match response.encode() {
                Ok(frame) => return Some(Transmission::new(frame, Purpose::Response)),
                Err(error) => error!("cannot encode response {:?}: {}", response, error),
            }
        }
        let addressed = self.port.is_some();
        let outbound = self.outbound.as_mut()?;
        if outbound.phase != Phase::Queued
            {return None}
        if !outbound.broadcast && outbound.attempts >= self.config.retries {
            warn!("packet {} undelivered, no attempt allowed", outbound.sequence.value());
            self.finish_send(false);
            return None
        }
        match outbound.encode(addressed) {
            Ok(frame) => {
                outbound.attempts = outbound.attempts.saturating_add(1);
                outbound.phase = Phase::Transmitting;
                debug!("transmitting packet {}, attempt {}", outbound.sequence.value(), outbound.attempts);
                Some(Transmission::new(frame, Purpose::Data))
            },
            Err(error) => {
                error!("cannot encode packet: {}", error);
                self.finish_send(false);
                None
            },
        }
    }

    /// once the link is drained, start waiting for the response and release a half-duplex line
    fn complete_transmission(&mut self, now: Millis) -> Result<(), L::Error> {
        let written = self.transmission.as_ref().is_some_and(Transmission::done);
        if written && self.link.flushed()? {
            let purpose = self.transmission.take().map(|transmission| transmission.purpose);
            if purpose == Some(Purpose::Data) {
                self.on_transmitted(now);
            }
        }
        if self.config.half_duplex && self.transmission.is_none() && self.direction == Direction::Transmit {
            self.link.set_direction(Direction::Receive)?;
            self.direction = Direction::Receive;
        }
        Ok(())
    }

    fn on_transmitted(&mut self, now: Millis) {
        // the send may have been aborted meanwhile
        let Some(outbound) = self.outbound.as_mut()
            else {return};
        if outbound.phase != Phase::Transmitting
            {return}
        if outbound.broadcast {
            debug!("broadcast sent");
            self.finish_send(true);
        }
        else {
            outbound.phase = Phase::AwaitingAck;
            self.send_timer.arm(now, self.config.send_timeout);
        }
    }
}
