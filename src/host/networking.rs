use std::{
    collections::VecDeque,
    convert::Infallible,
    path::Path,
    time::Duration,
    vec::Vec,
    };
use serial2_tokio::{SerialPort, CharSize, StopBits, Parity};
use log::*;

use crate::{
    Config, PacketServer, Message,
    link::Link,
    timer::StdClock,
    };
use super::{Error, LineSettings};


/// in-memory link of a [Host] server, bytes are moved to and from the serial port by [Host::pump]
#[derive(Debug, Default)]
pub struct Buffered {
    input: VecDeque<u8>,
    output: VecDeque<u8>,
}

impl Link for Buffered {
    type Error = Infallible;

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        Ok(self.input.pop_front())
    }
    fn write(&mut self, byte: u8) -> Result<bool, Self::Error> {
        self.output.push_back(byte);
        Ok(true)
    }
    fn flushed(&mut self) -> Result<bool, Self::Error> {
        Ok(self.output.is_empty())
    }
}


/**
    packet server on a serial port

    the line is full-duplex from the host's point of view, half-duplex adapters (RS485 and such) switch direction on their own
*/
pub struct Host {
    /// uart RX/TX stream
    port: SerialPort,
    server: PacketServer<Buffered, StdClock>,
    /// longest wait for input in one pump
    tick: Duration,
}

impl Host {
    /// open the serial port file with the given line settings
    pub fn open(path: impl AsRef<Path>, line: LineSettings, config: Config) -> Result<Self, Error> {
        let stop_bits = match line.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            _ => return Err(Error::Settings("stop bits must be 1 or 2")),
        };
        let port = SerialPort::open(path, |mut settings: serial2_tokio::Settings| {
                settings.set_raw();
                settings.set_baud_rate(line.rate)?;
                settings.set_char_size(CharSize::Bits8);
                settings.set_stop_bits(stop_bits);
                settings.set_parity(Parity::None);
                Ok(settings)
                })?;
        Self::new(port, config)
    }
    /// run on an already opened serial port, with an empty receive buffer
    pub fn new(port: SerialPort, config: Config) -> Result<Self, Error> {
        let mut server = PacketServer::new(Buffered::default(), StdClock::new(), config)?;
        server.set_receive_buffer(Some(Message::new()));
        Ok(Self {
            port,
            server,
            tick: Duration::from_millis(1),
        })
    }
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
    pub fn server(&self) -> &PacketServer<Buffered, StdClock> {&self.server}
    pub fn server_mut(&mut self) -> &mut PacketServer<Buffered, StdClock> {&mut self.server}

    /**
        one iteration of the protocol: poll the server, write what it produced, then wait at most one tick for input

        it **must** be called repeatedly for anything to happen
    */
    pub async fn pump(&mut self) -> Result<(), Error> {
        self.server.poll().unwrap_or_else(|never| match never {});

        let pending: Vec<u8> = self.server.link_mut().output.drain(..).collect();
        if !pending.is_empty() {
            trace!("writing {} bytes", pending.len());
            self.port.write_all(&pending).await?;
        }

        let mut received = [0u8; 64];
        if let Ok(read) = tokio::time::timeout(self.tick, self.port.read(&mut received)).await {
            let size = read?;
            trace!("read {} bytes", size);
            self.server.link_mut().input.extend(&received[.. size]);
        }
        Ok(())
    }

    /// send a directed packet and pump until it is acknowledged or given up
    pub async fn deliver(&mut self, destination: Option<u8>, payload: &[u8]) -> Result<(), Error> {
        match destination {
            Some(destination) => self.server.send_to(destination, payload)?,
            None => self.server.send(payload)?,
        }
        self.complete().await
    }
    /// send a broadcast and pump until it is transmitted
    pub async fn broadcast(&mut self, destination: Option<u8>, payload: &[u8]) -> Result<(), Error> {
        match destination {
            Some(destination) => self.server.broadcast_to(destination, payload)?,
            None => self.server.broadcast(payload)?,
        }
        self.complete().await
    }
    /// pump until a packet is delivered, giving back the filled buffer
    pub async fn receive(&mut self, timeout: Duration) -> Result<Message, Error> {
        if self.server.receive_buffer().is_none() {
            self.server.set_receive_buffer(Some(Message::new()));
        }
        tokio::time::timeout(timeout, self.wait_message()).await
            .map_err(|_| Error::Timeout)?
    }

    async fn complete(&mut self) -> Result<(), Error> {
        while !self.server.buffer_sent() {
            self.pump().await?;
        }
        if self.server.send_error()
            {Err(Error::Undelivered)}
        else
            {Ok(())}
    }
    async fn wait_message(&mut self) -> Result<Message, Error> {
        loop {
            if let Some(message) = self.server.take_message()
                {break Ok(message)}
            self.pump().await?;
        }
    }
}
