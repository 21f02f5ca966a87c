/*!
    4 bit sequence numbers

    directed packets carry a sequence number cycling modulo 16. The receiver keeps one expected number per local destination port, the sender one per destination port.
*/

use bilge::prelude::*;


/// number of distinct ports, and so of table entries
pub const PORTS: usize = 16;

pub fn next(sequence: u4) -> u4 {
    u4::new(sequence.value().wrapping_add(1) & 0x0f)
}
pub fn previous(sequence: u4) -> u4 {
    u4::new(sequence.value().wrapping_sub(1) & 0x0f)
}


/// classification of an incoming sequence number
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// next packet, to deliver
    Expected,
    /// retransmission of the last delivered packet, whose ack was lost
    Duplicate,
    /// nothing was ever accepted on this port, the sender must restart from our number
    Unsynchronized,
    /// anything else
    Mismatch,
}

/// expected next sequence number of every local destination port
#[derive(Clone, Debug)]
pub struct SequenceTable {
    expected: [u4; PORTS],
    /// bit per port, set once a packet was accepted on it
    synchronized: u16,
}

impl Default for SequenceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceTable {
    pub fn new() -> Self {
        Self {
            expected: [u4::new(0); PORTS],
            synchronized: 0,
        }
    }
    pub fn expected(&self, port: u4) -> u4 {
        self.expected[usize::from(port.value())]
    }
    pub fn synchronized(&self, port: u4) -> bool {
        self.synchronized & (1 << port.value()) != 0
    }
    pub fn check(&self, port: u4, sequence: u4) -> Verdict {
        let expected = self.expected(port);
        if sequence == expected
            {Verdict::Expected}
        else if !self.synchronized(port)
            {Verdict::Unsynchronized}
        else if sequence == previous(expected)
            {Verdict::Duplicate}
        else
            {Verdict::Mismatch}
    }
    /// accept the expected packet on this port
    pub fn advance(&mut self, port: u4) {
        let index = usize::from(port.value());
        self.expected[index] = next(self.expected[index]);
        self.synchronized |= 1 << port.value();
    }
    /// drop what is known about this port, next packet will be answered with a reset
    pub fn forget(&mut self, port: u4) {
        self.expected[usize::from(port.value())] = u4::new(0);
        self.synchronized &= !(1 << port.value());
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_around() {
        assert_eq!(next(u4::new(15)), u4::new(0));
        assert_eq!(previous(u4::new(0)), u4::new(15));
        assert_eq!(next(u4::new(7)), u4::new(8));
    }

    #[test]
    fn verdicts() {
        let port = u4::new(3);
        let mut table = SequenceTable::new();
        assert_eq!(table.check(port, u4::new(0)), Verdict::Expected);
        assert_eq!(table.check(port, u4::new(15)), Verdict::Unsynchronized);
        assert_eq!(table.check(port, u4::new(6)), Verdict::Unsynchronized);

        table.advance(port);
        assert_eq!(table.check(port, u4::new(1)), Verdict::Expected);
        assert_eq!(table.check(port, u4::new(0)), Verdict::Duplicate);
        assert_eq!(table.check(port, u4::new(6)), Verdict::Mismatch);
        // other ports are unaffected
        assert_eq!(table.check(u4::new(4), u4::new(0)), Verdict::Expected);

        for _ in 0 .. 15 {
            table.advance(port);
        }
        assert_eq!(table.expected(port), u4::new(0));
        assert_eq!(table.check(port, u4::new(15)), Verdict::Duplicate);

        table.forget(port);
        assert!(!table.synchronized(port));
        assert_eq!(table.check(port, u4::new(15)), Verdict::Unsynchronized);
    }
}
