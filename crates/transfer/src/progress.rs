use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Upload speed derived from the offsets a server acknowledges.
///
/// Keeps `(instant, offset)` points inside a sliding window; the rate is the
/// offset gained between the oldest and newest point.
pub struct SpeedCalculator {
    points: VecDeque<(Instant, u64)>,
    max_points: usize,
    window: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window`: time span the rate is averaged over (default 5 s).
    /// - `max_points`: maximum retained points (default 100).
    pub fn new(window: Option<Duration>, max_points: Option<usize>) -> Self {
        Self {
            points: VecDeque::new(),
            max_points: max_points.unwrap_or(100).max(2),
            window: window.unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Records that `offset` bytes are stored as of now.
    pub fn record(&mut self, offset: u64) {
        self.record_at(Instant::now(), offset);
    }

    fn record_at(&mut self, now: Instant, offset: u64) {
        // A smaller offset means the stored file moved backwards; the old
        // points no longer describe this transfer.
        if self.points.back().is_some_and(|&(_, last)| offset < last) {
            self.points.clear();
        }
        self.points.push_back((now, offset));

        while self.points.len() > 2
            && self
                .points
                .front()
                .is_some_and(|&(t, _)| now.duration_since(t) > self.window)
        {
            self.points.pop_front();
        }
        while self.points.len() > self.max_points {
            self.points.pop_front();
        }
    }

    /// Average bytes/second across the window, or 0.0 with fewer than two points.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(&(t0, first)), Some(&(t1, last))) = (self.points.front(), self.points.back())
        else {
            return 0.0;
        };
        let elapsed = t1.duration_since(t0);
        if elapsed.is_zero() {
            return 0.0;
        }
        (last - first) as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to transfer `remaining` bytes at the current speed.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }

    /// Forgets every point, e.g. after a reconnect stalled the transfer.
    pub fn reset(&mut self) {
        self.points.clear();
    }
}
