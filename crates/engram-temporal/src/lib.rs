//! # engram-temporal
//!
//! Parses temporal phrases out of an English recall query and turns them
//! into a closed UTC interval, returning the residual query text. A query
//! with no recognised phrase comes back unchanged with `Timeframe::None`.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use engram_core::models::{TimeInterval, Timeframe};

/// What "a few" means, in days. A bare "recent"/"recently" also covers
/// the last `FEW_DAYS` days.
pub const FEW_DAYS: i64 = 3;

/// Result of scanning a query for a temporal phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeExtraction {
    /// The query with the matched phrase removed and whitespace collapsed.
    pub cleaned_query: String,
    pub timeframe: Timeframe,
    /// The phrase as it appeared in the query, when one matched.
    pub original_phrase: Option<String>,
}

type PhraseHandler = fn(&Captures<'_>, DateTime<Utc>) -> TimeInterval;

static PHRASES: Lazy<Vec<(Regex, PhraseHandler)>> = Lazy::new(|| {
    let rule = |pattern: &str, handler: PhraseHandler| {
        (
            Regex::new(&format!(r"(?i)\b{pattern}\b")).expect("phrase pattern compiles"),
            handler,
        )
    };
    vec![
        rule(r"today", |_, now| TimeInterval::new(start_of_day(now), now)),
        rule(r"this\s+morning", |_, now| {
            TimeInterval::new(start_of_day(now), now)
        }),
        rule(r"yesterday", |_, now| day_window(now - Duration::days(1))),
        rule(r"last\s+week", |_, now| {
            TimeInterval::new(now - Duration::days(7), now)
        }),
        rule(r"this\s+week", |_, now| {
            TimeInterval::new(now - Duration::days(7), now)
        }),
        rule(r"last\s+month", |_, now| {
            TimeInterval::new(now - Duration::days(30), now)
        }),
        rule(r"last\s+year", |_, now| {
            TimeInterval::new(now - Duration::days(365), now)
        }),
        rule(r"(?:a\s+)?few\s+days\s+ago", |_, now| {
            day_window(now - Duration::days(FEW_DAYS))
        }),
        rule(r"a\s+couple\s+(?:of\s+)?days\s+ago", |_, now| {
            day_window(now - Duration::days(2))
        }),
        rule(r"(\d+)\s+days?\s+ago", |caps, now| {
            day_window(now - Duration::days(captured_number(caps)))
        }),
        rule(r"(\d+)\s+hours?\s+ago", |caps, now| {
            TimeInterval::new(now - Duration::hours(captured_number(caps)), now)
        }),
        rule(r"(\d+)\s+weeks?\s+ago", |caps, now| {
            let target = now - Duration::weeks(captured_number(caps));
            TimeInterval::new(
                start_of_day(target - Duration::days(3)),
                end_of_day(target + Duration::days(3)),
            )
        }),
        rule(r"recent(?:ly)?", |_, now| {
            TimeInterval::new(now - Duration::days(FEW_DAYS), now)
        }),
    ]
});

/// Scan `query` for the first recognised temporal phrase.
pub fn extract_timeframe(query: &str) -> TimeframeExtraction {
    extract_timeframe_at(query, Utc::now())
}

/// Deterministic variant taking the clock as an argument (for tests).
pub fn extract_timeframe_at(query: &str, now: DateTime<Utc>) -> TimeframeExtraction {
    for (pattern, handler) in PHRASES.iter() {
        if let Some(caps) = pattern.captures(query) {
            let matched = caps.get(0).expect("group 0 always present");
            let interval = handler(&caps, now);
            let mut cleaned = String::with_capacity(query.len());
            cleaned.push_str(&query[..matched.start()]);
            cleaned.push(' ');
            cleaned.push_str(&query[matched.end()..]);
            return TimeframeExtraction {
                cleaned_query: collapse_whitespace(&cleaned),
                timeframe: Timeframe::Interval(interval),
                original_phrase: Some(matched.as_str().to_string()),
            };
        }
    }

    TimeframeExtraction {
        cleaned_query: query.to_string(),
        timeframe: Timeframe::None,
        original_phrase: None,
    }
}

fn captured_number(caps: &Captures<'_>) -> i64 {
    caps.get(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1)
}

fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is valid")
        .and_utc()
}

fn end_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .expect("end of day is valid")
        .and_utc()
}

fn day_window(t: DateTime<Utc>) -> TimeInterval {
    TimeInterval::new(start_of_day(t), end_of_day(t))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
