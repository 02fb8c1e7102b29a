// Clock sources and the scheduling tick
// Every time-dependent component reads time through `ClockSource`, so tests
// can drive the whole engine without a real timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic time in seconds
pub trait ClockSource: Send + Sync {
    fn now(&self) -> f64;
}

impl<C: ClockSource + ?Sized> ClockSource for Arc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// Wall clock based on `Instant`, zero at construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually driven clock, shareable between threads
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// One scheduling tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Clock time of the tick
    pub now: f64,
    /// Time since the previous tick (0 for the first)
    pub delta: f64,
    /// Tick counter, starting at 0
    pub frame: u64,
}

/// Fixed-cadence tick generator over any clock source
///
/// Replaces animation-frame callbacks: the owner polls it and does its
/// per-frame work whenever a tick is returned.
#[derive(Debug)]
pub struct FrameTicker<C: ClockSource> {
    clock: C,
    interval: f64,
    last: Option<f64>,
    frame: u64,
}

impl<C: ClockSource> FrameTicker<C> {
    /// `rate_hz` ticks per second
    pub fn new(clock: C, rate_hz: f64) -> Self {
        Self {
            clock,
            interval: 1.0 / rate_hz.max(f64::MIN_POSITIVE),
            last: None,
            frame: 0,
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Returns a tick if at least one interval elapsed since the last one
    pub fn poll(&mut self) -> Option<Tick> {
        let now = self.clock.now();
        let delta = match self.last {
            None => 0.0,
            Some(last) if now - last >= self.interval => now - last,
            Some(_) => return None,
        };
        self.last = Some(now);
        let tick = Tick {
            now,
            delta,
            frame: self.frame,
        };
        self.frame += 1;
        Some(tick)
    }

    /// Seconds until the next tick is due
    pub fn time_until_next(&self) -> f64 {
        match self.last {
            None => 0.0,
            Some(last) => (last + self.interval - self.clock.now()).max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1.0);
        assert_eq!(clock.now(), 1.0);
        clock.advance(0.5);
        assert_eq!(clock.now(), 1.5);

        let shared = clock.clone();
        shared.set(3.0);
        assert_eq!(clock.now(), 3.0);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_frame_ticker_cadence() {
        let clock = ManualClock::new(0.0);
        let mut ticker = FrameTicker::new(clock.clone(), 10.0);

        let first = ticker.poll().unwrap();
        assert_eq!(first.frame, 0);
        assert_eq!(first.delta, 0.0);
        assert!(ticker.poll().is_none());

        clock.advance(0.05);
        assert!(ticker.poll().is_none());
        assert!((ticker.time_until_next() - 0.05).abs() < 1e-9);

        clock.advance(0.06);
        let second = ticker.poll().unwrap();
        assert_eq!(second.frame, 1);
        assert!((second.delta - 0.11).abs() < 1e-9);
    }
}
