// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Timestamp sources. Every timestamp handed out is strictly greater than
//! every timestamp handed out or observed before it.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

pub trait TimestampProvider: Send + Sync {
    /// A fresh timestamp.
    fn next(&self) -> i64;

    /// Records a timestamp used elsewhere so later calls to `next` exceed it.
    fn observe(&self, timestamp: i64);

    /// Last timestamp handed out or observed.
    fn current(&self) -> i64;
}

/// Wall-clock microseconds, nudged forward when the clock stalls.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimestampProvider for MonotonicClock {
    fn next(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange(last, candidate, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    fn observe(&self, timestamp: i64) {
        self.last.fetch_max(timestamp, Ordering::AcqRel);
    }

    fn current(&self) -> i64 {
        self.last.load(Ordering::Acquire)
    }
}

/// Counter-based clock for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: AtomicI64,
}

impl LogicalClock {
    pub fn starting_at(timestamp: i64) -> Self {
        Self {
            last: AtomicI64::new(timestamp),
        }
    }
}

impl TimestampProvider for LogicalClock {
    fn next(&self) -> i64 {
        self.last.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn observe(&self, timestamp: i64) {
        self.last.fetch_max(timestamp, Ordering::AcqRel);
    }

    fn current(&self) -> i64 {
        self.last.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_never_repeats() {
        let clock = MonotonicClock::new();
        let a = clock.next();
        let b = clock.next();
        assert!(b > a);
        clock.observe(b + 1_000_000_000);
        assert!(clock.next() > b + 1_000_000_000);
    }

    #[test]
    fn test_monotonic_saturates_at_max() {
        let clock = MonotonicClock::new();
        clock.observe(i64::MAX);
        assert_eq!(clock.next(), i64::MAX);
    }

    #[test]
    fn test_logical_clock() {
        let clock = LogicalClock::starting_at(10);
        assert_eq!(clock.next(), 11);
        clock.observe(20);
        assert_eq!(clock.current(), 20);
        assert_eq!(clock.next(), 21);
        clock.observe(5);
        assert_eq!(clock.next(), 22);
    }
}
