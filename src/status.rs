//! Carriage-return progress line with a smoothed rate estimate.
//!
//! The reporter is passive: a status task in each pipeline wakes every
//! `STATUS_UPDATE_TIME` and feeds it the current figure. Output goes to
//! the error stream so it never mixes with pipeline data on stdout.

use std::io::Write;
use std::time::Instant;

/// Weight of the newest sample in the exponential average
const RATE_SMOOTHING: f64 = 0.3;

/// Renders `<current> <unit>  <rate> <rate-unit>  [ETA mm:ss]`
#[derive(Debug)]
pub struct StatusLine {
    unit: &'static str,
    rate_unit: &'static str,
    total: Option<u64>,
    last_value: u64,
    last_time: Instant,
    rate: Option<f64>,
}

impl StatusLine {
    /// Create a reporter. `total` enables the ETA field; pass `None` for
    /// open-ended runs.
    pub fn new(unit: &'static str, rate_unit: &'static str, total: Option<u64>) -> Self {
        Self {
            unit,
            rate_unit,
            total: total.filter(|&t| t > 0),
            last_value: 0,
            last_time: Instant::now(),
            rate: None,
        }
    }

    /// Fold `current` into the rate estimate and print the refreshed line
    pub fn update(&mut self, current: u64) {
        let line = self.sample(current, Instant::now());
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r{line}");
        let _ = err.flush();
    }

    /// Terminate the line once the run is over
    pub fn finish(&self) {
        eprintln!();
    }

    fn sample(&mut self, current: u64, now: Instant) -> String {
        let dt = now.duration_since(self.last_time).as_secs_f64();
        if dt > 0.0 {
            let sample = (current.saturating_sub(self.last_value)) as f64 / dt;
            self.rate = Some(match self.rate {
                None => sample,
                Some(prev) => RATE_SMOOTHING * sample + (1.0 - RATE_SMOOTHING) * prev,
            });
        }
        self.last_value = current;
        self.last_time = now;
        self.render(current)
    }

    fn render(&self, current: u64) -> String {
        let rate = self.rate.unwrap_or(0.0);
        let mut line = format!("{} {}  {:.1} {}", current, self.unit, rate, self.rate_unit);
        if let Some(total) = self.total {
            if rate > 0.0 {
                let remaining = total.saturating_sub(current) as f64 / rate;
                let secs = remaining.round() as u64;
                line.push_str(&format!("  ETA {:02}:{:02}", secs / 60, secs % 60));
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_sample_sets_rate() {
        let start = Instant::now();
        let mut status = StatusLine::new("KiB", "KiB/s", None);
        status.last_time = start;
        let line = status.sample(1000, start + Duration::from_secs(1));
        assert_eq!(line, "1000 KiB  1000.0 KiB/s");
    }

    #[test]
    fn test_rate_is_smoothed() {
        let start = Instant::now();
        let mut status = StatusLine::new("IOs", "IO/s", None);
        status.last_time = start;
        status.sample(100, start + Duration::from_secs(1));
        let line = status.sample(100, start + Duration::from_secs(2));
        // a dead second drags the estimate down by the smoothing weight only
        assert_eq!(line, "100 IOs  70.0 IO/s");
    }

    #[test]
    fn test_eta_shown_with_finite_total() {
        let start = Instant::now();
        let mut status = StatusLine::new("KiB", "KiB/s", Some(3000));
        status.last_time = start;
        let line = status.sample(1000, start + Duration::from_secs(1));
        assert_eq!(line, "1000 KiB  1000.0 KiB/s  ETA 00:02");
    }

    #[test]
    fn test_no_eta_without_total_or_rate() {
        let start = Instant::now();
        let mut status = StatusLine::new("KiB", "KiB/s", Some(100));
        status.last_time = start;
        // zero progress: no usable rate, so no ETA yet
        let line = status.sample(0, start + Duration::from_secs(1));
        assert_eq!(line, "0 KiB  0.0 KiB/s");
    }

    #[test]
    fn test_eta_minutes_roll() {
        let start = Instant::now();
        let mut status = StatusLine::new("KiB", "KiB/s", Some(200_000));
        status.last_time = start;
        let line = status.sample(10_000, start + Duration::from_secs(10));
        // 190000 remaining at 1000/s = 190s
        assert_eq!(line, "10000 KiB  1000.0 KiB/s  ETA 03:10");
    }
}
