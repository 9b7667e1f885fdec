//! Cooperative interval timers driven by the event loop.

use std::time::{Duration, Instant};

/// A repeating timer that can be stopped and restarted.
#[derive(Clone, Debug)]
pub struct Ticker {
    interval: Duration,
    next: Option<Instant>,
}

impl Ticker {
    /// A stopped ticker.
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    pub const fn is_running(&self) -> bool {
        self.next.is_some()
    }

    /// Start firing one interval after `now`; a running ticker keeps its schedule.
    pub fn start(&mut self, now: Instant) {
        if self.next.is_none() {
            self.next = Some(now + self.interval);
        }
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    /// Whether the ticker fires at `now`. Missed intervals collapse into one firing.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next {
            Some(next) if now >= next => {
                self.next = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    /// When the ticker fires next, if running.
    pub const fn deadline(&self) -> Option<Instant> {
        self.next
    }
}

/// The physics, draw and status tickers.
#[derive(Clone, Debug)]
pub struct Timers {
    pub physics: Ticker,
    pub draw: Ticker,
    pub status: Ticker,
}

impl Timers {
    /// Stopped tickers with the given intervals.
    pub const fn new(physics: Duration, draw: Duration, status: Duration) -> Self {
        Self {
            physics: Ticker::new(physics),
            draw: Ticker::new(draw),
            status: Ticker::new(status),
        }
    }

    /// Earliest deadline of any running ticker.
    pub fn next_deadline(&self) -> Option<Instant> {
        [&self.physics, &self.draw, &self.status]
            .into_iter()
            .filter_map(Ticker::deadline)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn stopped_ticker_never_fires() {
        let mut ticker = Ticker::new(MS);
        let now = Instant::now();
        assert!(!ticker.poll(now + MS * 10));
        assert!(ticker.deadline().is_none());
    }

    #[test]
    fn fires_once_per_elapsed_interval() {
        let start = Instant::now();
        let mut ticker = Ticker::new(MS * 5);
        ticker.start(start);
        assert!(!ticker.poll(start + MS * 4));
        assert!(ticker.poll(start + MS * 5));
        assert!(!ticker.poll(start + MS * 6));
        // a long stall fires once, not once per missed interval
        assert!(ticker.poll(start + MS * 100));
        assert!(!ticker.poll(start + MS * 101));
    }

    #[test]
    fn restart_keeps_a_running_schedule() {
        let start = Instant::now();
        let mut ticker = Ticker::new(MS * 5);
        ticker.start(start);
        ticker.start(start + MS * 4);
        assert_eq!(ticker.deadline(), Some(start + MS * 5));

        ticker.stop();
        assert!(!ticker.is_running());
        ticker.start(start + MS * 10);
        assert_eq!(ticker.deadline(), Some(start + MS * 15));
    }

    #[test]
    fn next_deadline_ignores_stopped_tickers() {
        let start = Instant::now();
        let mut timers = Timers::new(MS, MS * 2, MS * 50);
        assert!(timers.next_deadline().is_none());

        timers.status.start(start);
        timers.draw.start(start);
        assert_eq!(timers.next_deadline(), Some(start + MS * 2));
    }
}
