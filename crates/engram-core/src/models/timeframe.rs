use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed UTC interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Temporal scope of a search: unbounded, one interval, or a union of
/// intervals ORed together in the generated predicate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    None,
    Interval(TimeInterval),
    Intervals(Vec<TimeInterval>),
}

impl Timeframe {
    /// All intervals in this timeframe, empty when unbounded.
    pub fn intervals(&self) -> Vec<TimeInterval> {
        match self {
            Timeframe::None => Vec::new(),
            Timeframe::Interval(i) => vec![*i],
            Timeframe::Intervals(is) => is.clone(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Timeframe::None)
    }
}

impl From<TimeInterval> for Timeframe {
    fn from(interval: TimeInterval) -> Self {
        Timeframe::Interval(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn interval_containment_is_closed() {
        let end = Utc::now();
        let start = end - Duration::days(7);
        let i = TimeInterval::new(start, end);
        assert!(i.contains(start));
        assert!(i.contains(end));
        assert!(!i.contains(end + Duration::seconds(1)));
    }

    #[test]
    fn none_has_no_intervals() {
        assert!(Timeframe::None.intervals().is_empty());
        assert!(Timeframe::None.is_none());
    }
}
