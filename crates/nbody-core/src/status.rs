//! Frame and computation rates and the status line shown by the shell.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use crate::constants::RATE_WINDOW;

/// Rolling window of the last intervals between two events.
#[derive(Clone, Debug)]
pub struct IntervalWindow {
    intervals: VecDeque<Duration>,
    capacity: usize,
    last: Option<Instant>,
}

impl Default for IntervalWindow {
    fn default() -> Self {
        Self::new(RATE_WINDOW)
    }
}

impl IntervalWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            intervals: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
            last: None,
        }
    }

    /// Record an event at `now`; the first event only starts the clock.
    pub fn tick(&mut self, now: Instant) {
        if let Some(last) = self.last {
            self.push(now.saturating_duration_since(last));
        }
        self.last = Some(now);
    }

    /// Record one interval, dropping the oldest once the window is full.
    pub fn push(&mut self, interval: Duration) {
        self.intervals.push_back(interval);
        if self.intervals.len() > self.capacity {
            self.intervals.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Events per second over the window.
    pub fn rate(&self) -> f64 {
        let elapsed: Duration = self.intervals.iter().sum();
        if elapsed.is_zero() {
            return 0.0;
        }
        self.intervals.len() as f64 / elapsed.as_secs_f64()
    }

    /// Forget the clock so a pause does not count as one long interval.
    pub fn restart(&mut self) {
        self.last = None;
    }
}

/// Snapshot printed as the window title.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatusLine {
    pub frames_per_second: f64,
    pub graphics_ms: f64,
    pub computations_per_second: f64,
    pub compute_ms: f64,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "N-body simulation - [fps: {:.0} @ {} ms] - [cps: {:.0} @ {} ms]",
            self.frames_per_second,
            significant(self.graphics_ms, 3),
            self.computations_per_second,
            significant(self.compute_ms, 3),
        )
    }
}

/// Format with `digits` significant digits, keeping trailing zeros.
pub fn significant(value: f64, digits: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{:.*}", digits.saturating_sub(1), 0.0);
    }
    let magnitude = value.abs().log10().floor() as i64;
    let decimals = (digits as i64 - 1 - magnitude).max(0) as usize;
    let rounded = format!("{value:.decimals$}");
    // rounding can carry into a new digit (9.996 -> 10.00)
    let carried = rounded.trim_start_matches('-').split('.').next().map_or(0, str::len);
    if decimals > 0 && carried as i64 > magnitude + 1 {
        format!("{value:.prec$}", prec = decimals - 1)
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_bounded() {
        let mut window = IntervalWindow::new(100);
        for _ in 0..150 {
            window.push(Duration::from_millis(10));
        }
        assert_eq!(window.len(), 100);
        assert!((window.rate() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn first_tick_only_starts_clock() {
        let mut window = IntervalWindow::default();
        let start = Instant::now();
        window.tick(start);
        assert!(window.is_empty());
        window.tick(start + Duration::from_millis(20));
        assert_eq!(window.len(), 1);
        assert!((window.rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn restart_skips_pause() {
        let mut window = IntervalWindow::default();
        let start = Instant::now();
        window.tick(start);
        window.restart();
        window.tick(start + Duration::from_secs(10));
        assert!(window.is_empty());
    }

    #[test]
    fn empty_window_rate_is_zero() {
        assert_eq!(IntervalWindow::default().rate(), 0.0);
    }

    #[test]
    fn significant_digits() {
        assert_eq!(significant(1.5, 3), "1.50");
        assert_eq!(significant(12.345, 3), "12.3");
        assert_eq!(significant(0.1234, 3), "0.123");
        assert_eq!(significant(456.7, 3), "457");
        assert_eq!(significant(9.996, 3), "10.0");
        assert_eq!(significant(0.0, 3), "0.00");
    }

    #[test]
    fn status_line_format() {
        let status = StatusLine {
            frames_per_second: 143.6,
            graphics_ms: 2.5,
            computations_per_second: 512.2,
            compute_ms: 0.875,
        };
        assert_eq!(
            status.to_string(),
            "N-body simulation - [fps: 144 @ 2.50 ms] - [cps: 512 @ 0.875 ms]"
        );
    }
}
