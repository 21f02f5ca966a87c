/*!
    the byte oriented serial link a [PacketServer](crate::PacketServer) runs on

    pins, baud rate, stop bits and hardware handshake are the concern of the link implementation. The protocol only needs non-blocking byte reads and writes, to know when the output is drained, and on a half-duplex line to choose the line direction.
*/


/// direction of a half-duplex line
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Receive,
    Transmit,
}

/// non-blocking byte link
pub trait Link {
    type Error;

    /// next received byte, if any
    fn read(&mut self) -> Result<Option<u8>, Self::Error>;
    /// queue a byte for transmission, false if the output buffer is currently full
    fn write(&mut self, byte: u8) -> Result<bool, Self::Error>;
    /// true when every written byte has left the link
    fn flushed(&mut self) -> Result<bool, Self::Error>;
    /// switch the line direction, only called on half-duplex lines
    fn set_direction(&mut self, _direction: Direction) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<L: Link + ?Sized> Link for &mut L {
    type Error = L::Error;

    fn read(&mut self) -> Result<Option<u8>, Self::Error>  {(**self).read()}
    fn write(&mut self, byte: u8) -> Result<bool, Self::Error>  {(**self).write(byte)}
    fn flushed(&mut self) -> Result<bool, Self::Error>  {(**self).flushed()}
    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error>  {(**self).set_direction(direction)}
}


/// link whose data line is inverted, every byte is complemented both ways
#[derive(Clone, Debug, Default)]
pub struct Inverted<L> {
    inner: L,
}

impl<L> Inverted<L> {
    pub fn new(inner: L) -> Self {
        Self {inner}
    }
    pub fn into_inner(self) -> L {self.inner}
    pub fn inner(&self) -> &L {&self.inner}
}

impl<L: Link> Link for Inverted<L> {
    type Error = L::Error;

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        Ok(self.inner.read()?.map(|byte| !byte))
    }
    fn write(&mut self, byte: u8) -> Result<bool, Self::Error> {
        self.inner.write(!byte)
    }
    fn flushed(&mut self) -> Result<bool, Self::Error> {
        self.inner.flushed()
    }
    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error> {
        self.inner.set_direction(direction)
    }
}
