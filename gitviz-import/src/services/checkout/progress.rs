//! Clone progress parsing and byte estimation
//!
//! git reports transfer progress as percentages, not bytes. The estimator
//! turns percentage deltas into bytes using an assumed repository size.

/// Extracts a transfer percentage from one line of clone output
pub trait ProgressParser: Send + Sync {
    fn parse_percent(&self, line: &str) -> Option<u8>;
}

/// Parses `Receiving objects:  45% (450/1000)` lines from git stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct GitProgressParser;

impl ProgressParser for GitProgressParser {
    fn parse_percent(&self, line: &str) -> Option<u8> {
        let rest = line.trim_start().strip_prefix("remote: ").unwrap_or(line.trim_start());
        let rest = rest.strip_prefix("Receiving objects:")?;
        let digits: String = rest
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let percent: u8 = digits.parse().ok()?;
        rest.trim_start()[digits.len()..]
            .starts_with('%')
            .then_some(percent.min(100))
    }
}

/// Converts percentage progress into estimated transferred bytes
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    assumed_size_bytes: u64,
    last_percent: u8,
}

impl ProgressEstimator {
    pub fn new(assumed_size_bytes: u64) -> Self {
        Self {
            assumed_size_bytes,
            last_percent: 0,
        }
    }

    /// Bytes implied by moving from the last seen percentage to `percent`
    ///
    /// Percentages that do not advance yield zero.
    pub fn observe(&mut self, percent: u8) -> u64 {
        let percent = percent.min(100);
        if percent <= self.last_percent {
            return 0;
        }
        let delta = u64::from(percent - self.last_percent);
        self.last_percent = percent;
        self.assumed_size_bytes * delta / 100
    }

    /// Start over for a new attempt
    pub fn reset(&mut self) {
        self.last_percent = 0;
    }
}
