//! Identifier and timestamp sources injected into the benchmark parser.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::errors::ChecklistError;

/// Produces opaque unique tokens for documents, STIG sections, and rules.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic UUID-shaped tokens counting up from 1.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Uuid::from_u128(u128::from(n)).to_string()
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Midnight UTC on the given date.
    pub fn at(year: i32, month: u32, day: u32) -> Result<Self, ChecklistError> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
            .single()
            .map(Self)
            .ok_or_else(|| {
                ChecklistError::Validation(format!("{year:04}-{month:02}-{day:02} is not a date"))
            })
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Timestamp form used for rule `createdAt`/`updatedAt`: microsecond UTC with a `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_ids_are_deterministic() {
        let ids = SequentialIdGenerator::new();
        assert_eq!(ids.next_id(), "00000000-0000-0000-0000-000000000001");
        assert_eq!(ids.next_id(), "00000000-0000-0000-0000-000000000002");
    }

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidGenerator;
        assert_ne!(ids.next_id(), ids.next_id());
    }

    #[test]
    fn timestamp_format() {
        let clock = FixedClock::at(2024, 1, 15).unwrap();
        assert_eq!(iso_timestamp(clock.now()), "2024-01-15T00:00:00.000000Z");
    }

    #[test]
    fn fixed_clock_rejects_impossible_dates() {
        assert!(FixedClock::at(2023, 2, 29).unwrap_err().is_validation());
        assert!(FixedClock::at(2024, 13, 1).is_err());
        assert!(FixedClock::at(2024, 2, 29).is_ok());
    }
}
