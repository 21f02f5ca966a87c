/*!
    in-memory links and clock

    this allows running servers against each other without hardware, and tampering with the bytes in transit.
*/

use core::convert::Infallible;
use std::{
    rc::Rc,
    cell::{Cell, RefCell},
    collections::VecDeque,
    };

use crate::{
    link::{Link, Direction},
    timer::{Clock, Millis},
    };


/// bytes travelling in one direction
pub type Wire = Rc<RefCell<VecDeque<u8>>>;

/**
    one end of an in-memory serial line

    on a half-duplex pipe, bytes written while not in transmit direction and bytes arriving while transmitting are counted as collisions. Received bytes are dropped in the latter case.
*/
#[derive(Clone, Debug)]
pub struct Pipe {
    input: Wire,
    output: Wire,
    half_duplex: bool,
    direction: Direction,
    collisions: Rc<Cell<usize>>,
}

impl Pipe {
    /// two ends of a full-duplex line
    pub fn pair() -> (Self, Self) {
        Self::make(false)
    }
    /// two ends of a half-duplex line
    pub fn half_duplex_pair() -> (Self, Self) {
        Self::make(true)
    }
    fn make(half_duplex: bool) -> (Self, Self) {
        let forward = Wire::default();
        let backward = Wire::default();
        let collisions = Rc::new(Cell::new(0));
        (
            Self {
                input: backward.clone(),
                output: forward.clone(),
                half_duplex,
                direction: Direction::Receive,
                collisions: collisions.clone(),
            },
            Self {
                input: forward,
                output: backward,
                half_duplex,
                direction: Direction::Receive,
                collisions,
            },
        )
    }
    /// bytes written by this end and not yet read by the other
    pub fn outgoing(&self) -> Wire {
        self.output.clone()
    }
    /// bytes written by the other end and not yet read by this one
    pub fn incoming(&self) -> Wire {
        self.input.clone()
    }
    /// collisions seen on the line, by both ends
    pub fn collisions(&self) -> usize {
        self.collisions.get()
    }
}

impl Link for Pipe {
    type Error = Infallible;

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        let mut input = self.input.borrow_mut();
        if self.half_duplex && self.direction == Direction::Transmit {
            if !input.is_empty() {
                self.collisions.set(self.collisions.get() + input.len());
                input.clear();
            }
            return Ok(None);
        }
        Ok(input.pop_front())
    }
    fn write(&mut self, byte: u8) -> Result<bool, Self::Error> {
        if self.half_duplex && self.direction != Direction::Transmit {
            self.collisions.set(self.collisions.get() + 1);
        }
        self.output.borrow_mut().push_back(byte);
        Ok(true)
    }
    fn flushed(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
    fn set_direction(&mut self, direction: Direction) -> Result<(), Self::Error> {
        self.direction = direction;
        Ok(())
    }
}


/// clock only moving when told to, clones share the same time
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn advance(&self, duration: Millis) {
        self.now.set(self.now.get().wrapping_add(duration));
    }
    pub fn set(&self, now: Millis) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.now.get()
    }
}
