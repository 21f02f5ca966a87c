/*!
    time keeping for the poll loop

    the protocol only needs a millisecond tick that wraps around, provided by a [Clock]. [Timer] is a one-shot deadline on that tick.
*/

/// milliseconds on a wrapping tick
pub type Millis = u32;

/// source of the current time
pub trait Clock {
    fn now(&self) -> Millis;
}

/// one-shot deadline, either armed or not
#[derive(Copy, Clone, Default, Debug, PartialEq)]
pub struct Timer {
    deadline: Option<Millis>,
}

impl Timer {
    pub const fn new() -> Self {
        Self {deadline: None}
    }
    /// fire `duration` after `now`, replacing any previous deadline
    pub fn arm(&mut self, now: Millis, duration: Millis) {
        self.deadline = Some(now.wrapping_add(duration));
    }
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
    pub fn armed(&self) -> bool {
        self.deadline.is_some()
    }
    /// true once the deadline is reached, valid as long as deadlines are less than half the tick range ahead
    pub fn expired(&self, now: Millis) -> bool {
        match self.deadline {
            Some(deadline) => now.wrapping_sub(deadline) < Millis::MAX / 2,
            None => false,
        }
    }
}


/// clock based on [std::time::Instant], counting from its creation
#[cfg(feature = "std")]
#[derive(Copy, Clone, Debug)]
pub struct StdClock {
    start: std::time::Instant,
}
#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {start: std::time::Instant::now()}
    }
}
#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}
#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now(&self) -> Millis {
        // the tick is meant to wrap
        self.start.elapsed().as_millis() as Millis
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlines() {
        let mut timer = Timer::new();
        assert!(!timer.expired(0));
        timer.arm(100, 20);
        assert!(timer.armed());
        assert!(!timer.expired(119));
        assert!(timer.expired(120));
        assert!(timer.expired(5000));
        timer.cancel();
        assert!(!timer.expired(5000));
    }

    #[test]
    fn wrapping_tick() {
        let mut timer = Timer::new();
        timer.arm(Millis::MAX - 5, 10);
        assert!(!timer.expired(Millis::MAX));
        assert!(!timer.expired(3));
        assert!(timer.expired(4));
    }
}
