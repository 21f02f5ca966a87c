/*!
    [Link] implementation for any uart driver implementing the [embedded_io] traits

    this covers full-duplex uarts of most HALs. Half-duplex lines need to drive a direction pin, implement [Link::set_direction] for them instead.
*/

use embedded_io::{Read, ReadReady, Write, WriteReady};

use crate::link::Link;


/// full-duplex uart exposed through [embedded_io]
pub struct IoLink<T> {
    uart: T,
}

impl<T> IoLink<T> {
    pub fn new(uart: T) -> Self {
        Self {uart}
    }
    pub fn into_inner(self) -> T {self.uart}
}

impl<T: Read + ReadReady + Write + WriteReady> Link for IoLink<T> {
    type Error = T::Error;

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        if !self.uart.read_ready()?
            {return Ok(None)}
        let mut byte = [0];
        Ok(match self.uart.read(&mut byte)? {
            0 => None,
            _ => Some(byte[0]),
        })
    }
    fn write(&mut self, byte: u8) -> Result<bool, Self::Error> {
        if !self.uart.write_ready()?
            {return Ok(false)}
        Ok(self.uart.write(&[byte])? == 1)
    }
    fn flushed(&mut self) -> Result<bool, Self::Error> {
        // embedded_io has no way to query the transmit fifo, flushing only blocks for the last bytes of a frame
        self.uart.flush()?;
        Ok(true)
    }
}
