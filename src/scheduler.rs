use chrono::{DateTime, Days, Duration, LocalResult, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MIN_EASE_FACTOR, ScheduleState, ScheduleUpdate};

/// Upper bound on a single review interval (about a century).
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Recall quality on the SM-2 scale, 0 (blackout) to 5 (perfect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;

    pub fn new(value: i32) -> Option<Self> {
        match value {
            0..=5 => Some(Self(value as u8)),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Qualities of 3 and above count as a successful recall.
    pub fn is_successful(self) -> bool {
        self.0 >= 3
    }
}

/// The four answer buttons shown after a card is revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub fn quality(self) -> Quality {
        match self {
            Rating::Again => Quality(1),
            Rating::Hard => Quality(3),
            Rating::Good => Quality(4),
            Rating::Easy => Quality(5),
        }
    }
}

impl From<Rating> for Quality {
    fn from(rating: Rating) -> Self {
        rating.quality()
    }
}

/// Result of scheduling one review, with the due date in the caller's zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledReview<Tz: TimeZone> {
    pub interval: u32,
    pub repetition: u32,
    pub ease_factor: f64,
    pub due_date: DateTime<Tz>,
}

impl<Tz: TimeZone> ScheduledReview<Tz> {
    pub fn to_update(&self) -> ScheduleUpdate {
        ScheduleUpdate {
            interval: self.interval,
            repetition: self.repetition,
            ease_factor: self.ease_factor,
            due_date: self.due_date.with_timezone(&Utc),
        }
    }
}

/// SM-2 spaced repetition scheduler.
#[derive(Debug, Clone, Copy)]
pub struct Sm2Scheduler {
    max_interval_days: u32,
}

impl Default for Sm2Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sm2Scheduler {
    pub fn new() -> Self {
        Self {
            max_interval_days: MAX_INTERVAL_DAYS,
        }
    }

    /// Computes the schedule that follows a review of the given quality.
    ///
    /// A failed recall (quality below 3) restarts the card at a one day
    /// interval and keeps its ease factor. A successful recall steps
    /// through 1 day, 6 days, then multiplies the previous interval by the
    /// previous ease factor, after which the ease factor is adjusted.
    ///
    /// The due date is `now` plus `interval` calendar days in `now`'s own
    /// time zone, so the wall-clock time survives DST transitions.
    pub fn compute<Tz: TimeZone>(
        &self,
        current: &ScheduleState,
        quality: Quality,
        now: DateTime<Tz>,
    ) -> ScheduledReview<Tz> {
        let (interval, repetition, ease_factor) = if quality.is_successful() {
            let interval = match current.repetition {
                0 => 1,
                1 => 6,
                _ => grow_interval(current.interval, current.ease_factor),
            };
            (
                interval.min(self.max_interval_days),
                current.repetition.saturating_add(1),
                adjust_ease_factor(current.ease_factor, quality),
            )
        } else {
            (1, 0, current.ease_factor)
        };

        let due_date = add_calendar_days(&now, interval);

        ScheduledReview {
            interval,
            repetition,
            ease_factor,
            due_date,
        }
    }
}

fn grow_interval(interval: u32, ease_factor: f64) -> u32 {
    // Float to int casts saturate.
    (f64::from(interval) * ease_factor).round() as u32
}

/// SM-2 ease factor adjustment, floored at 1.3.
pub fn adjust_ease_factor(ease_factor: f64, quality: Quality) -> f64 {
    let distance = f64::from(Quality::MAX - quality.value());
    let adjusted = ease_factor + (0.1 - distance * (0.08 + distance * 0.02));
    adjusted.max(MIN_EASE_FACTOR)
}

/// Adds whole calendar days, keeping the local wall-clock time.
///
/// An ambiguous target (clocks going back) resolves to the earlier
/// instant. A target inside a spring-forward gap keeps the UTC offset in
/// force at `start`, which lands just past the gap.
pub fn add_calendar_days<Tz: TimeZone>(start: &DateTime<Tz>, days: u32) -> DateTime<Tz> {
    let tz = start.timezone();
    let Some(target) = start.naive_local().checked_add_days(Days::new(u64::from(days))) else {
        return start.clone();
    };

    match tz.from_local_datetime(&target) {
        LocalResult::Single(due) => due,
        LocalResult::Ambiguous(first, second) => {
            if first <= second {
                first
            } else {
                second
            }
        }
        LocalResult::None => {
            let offset = start.offset().fix();
            let utc = target - Duration::seconds(i64::from(offset.local_minus_utc()));
            tz.from_utc_datetime(&utc)
        }
    }
}
