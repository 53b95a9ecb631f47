//! Fixed backoff schedule for reconnect attempts
//!
//! Failover takes a few seconds, so the schedule starts short and flattens
//! out instead of growing without bound.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wait before each reconnect attempt, in seconds, for the default schedule.
const FAILOVER_INTERVALS: [f64; 7] = [0.2, 0.5, 1.0, 2.0, 3.0, 3.0, 3.0];

/// Ordered waits used between reconnect attempts.
///
/// Attempts past the end of the schedule reuse the last interval.
///
/// # Example
///
/// ```
/// use relink_connection::reconnect::BackoffSchedule;
/// use std::time::Duration;
///
/// let schedule = BackoffSchedule::failover();
///
/// assert_eq!(schedule.delay(0), Duration::from_millis(200));
/// assert_eq!(schedule.delay(3), Duration::from_secs(2));
///
/// // Past the end the last interval repeats
/// assert_eq!(schedule.delay(20), Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BackoffSchedule {
    intervals: Vec<Duration>,
}

impl BackoffSchedule {
    /// Create a schedule from explicit intervals.
    ///
    /// An empty list becomes a single zero interval so that `delay` is
    /// always defined.
    pub fn new(intervals: Vec<Duration>) -> Self {
        if intervals.is_empty() {
            return Self {
                intervals: vec![Duration::ZERO],
            };
        }
        Self { intervals }
    }

    /// Create a schedule from intervals in seconds; negative or non-finite
    /// values are treated as zero.
    pub fn from_secs(intervals: &[f64]) -> Self {
        Self::new(
            intervals
                .iter()
                .map(|secs| Duration::try_from_secs_f64(*secs).unwrap_or(Duration::ZERO))
                .collect(),
        )
    }

    /// The failover schedule: 0.2s, 0.5s, 1s, 2s, then 3s.
    pub fn failover() -> Self {
        Self::from_secs(&FAILOVER_INTERVALS)
    }

    /// Wait before the zero-based `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let index = (attempt as usize).min(self.intervals.len() - 1);
        self.intervals[index]
    }

    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// A schedule always holds at least one interval.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::failover()
    }
}

impl TryFrom<Vec<f64>> for BackoffSchedule {
    type Error = String;

    fn try_from(secs: Vec<f64>) -> Result<Self, Self::Error> {
        if secs.is_empty() {
            return Err("backoff schedule needs at least one interval".into());
        }
        let intervals = secs
            .iter()
            .map(|value| {
                Duration::try_from_secs_f64(*value)
                    .map_err(|_| format!("invalid backoff interval: {value}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { intervals })
    }
}

impl From<BackoffSchedule> for Vec<f64> {
    fn from(schedule: BackoffSchedule) -> Self {
        schedule
            .intervals
            .iter()
            .map(Duration::as_secs_f64)
            .collect()
    }
}
