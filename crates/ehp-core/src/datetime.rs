// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Date/time source: reconstructs wall-clock from five periodic System
//! fields plus monotonic ticks; gates the data-point engine (spec.md
//! §4.8).

use crate::platform::Monotonic;

/// The five `DATETIME_*` value ids, in the order used to index per-field
/// freshness tracking.
pub const DATETIME_DAY_ID: u16 = 0x0122;
pub const DATETIME_MONTH_ID: u16 = 0x0123;
pub const DATETIME_YEAR_ID: u16 = 0x0124;
pub const DATETIME_HOUR_ID: u16 = 0x0125;
pub const DATETIME_MINUTE_ID: u16 = 0x0126;

const FIELD_COUNT: usize = 5;
const FIELD_IDS: [u16; FIELD_COUNT] = [
    DATETIME_DAY_ID,
    DATETIME_MONTH_ID,
    DATETIME_YEAR_ID,
    DATETIME_HOUR_ID,
    DATETIME_MINUTE_ID,
];

/// Re-request a field if it hasn't been refreshed within this long.
pub const FIELD_MAX_AGE_MS: u64 = 30_000;

/// A point in time down to minute precision, as carried by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

impl WallClock {
    /// Advance by a whole number of minutes, carrying through
    /// hour/day/month/year with leap-year handling.
    fn add_minutes(mut self, mut minutes: u64) -> Self {
        while minutes > 0 {
            let step = minutes.min(60 - self.minute as u64);
            self.minute += step as u8;
            minutes -= step;
            if self.minute >= 60 {
                self.minute = 0;
                self.hour += 1;
                if self.hour >= 24 {
                    self.hour = 0;
                    self.day += 1;
                    if self.day > days_in_month(self.year, self.month) {
                        self.day = 1;
                        self.month += 1;
                        if self.month > 12 {
                            self.month = 1;
                            self.year += 1;
                        }
                    }
                }
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FieldState {
    last_update_monotonic: Monotonic,
    last_request_monotonic: Monotonic,
    seen: bool,
}

/// Subscribes to the five constituent device-time fields and projects a
/// full [`WallClock`] forward from the last minute update using elapsed
/// monotonic time.
#[derive(Debug, Clone)]
pub struct DateTimeSource {
    fields: [FieldState; FIELD_COUNT],
    last_minute_update: WallClock,
    last_minute_update_monotonic: Monotonic,
}

impl Default for DateTimeSource {
    fn default() -> Self {
        Self {
            fields: [FieldState::default(); FIELD_COUNT],
            last_minute_update: WallClock {
                year: 2000,
                month: 1,
                day: 1,
                hour: 0,
                minute: 0,
            },
            last_minute_update_monotonic: 0,
        }
    }
}

impl DateTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn field_index(value_id: u16) -> Option<usize> {
        FIELD_IDS.iter().position(|&id| id == value_id)
    }

    /// `true` once every one of the five fields has been received at
    /// least once.
    pub fn available(&self) -> bool {
        self.fields.iter().all(|f| f.seen)
    }

    /// Apply an inbound sample for one of the five fields. `raw` is the
    /// device's raw encoding; the year field is `year mod 100`, offset by
    /// 2000 here.
    pub fn on_sample(&mut self, value_id: u16, raw: u16, now: Monotonic) {
        let Some(idx) = Self::field_index(value_id) else {
            return;
        };
        self.fields[idx].last_update_monotonic = now;
        self.fields[idx].seen = true;

        match value_id {
            DATETIME_DAY_ID => self.last_minute_update.day = raw as u8,
            DATETIME_MONTH_ID => self.last_minute_update.month = raw as u8,
            DATETIME_YEAR_ID => self.last_minute_update.year = 2000 + (raw as u16 % 100),
            DATETIME_HOUR_ID => self.last_minute_update.hour = raw as u8,
            DATETIME_MINUTE_ID => self.last_minute_update.minute = raw as u8,
            _ => unreachable!(),
        }
        // The projection baseline tracks the minute field specifically:
        // day/month/year/hour can each refresh independently without the
        // stored minute value having changed, and advancing the baseline
        // on those would make `current()` project forward from a time that
        // was never actually observed.
        if value_id == DATETIME_MINUTE_ID {
            self.last_minute_update_monotonic = now;
        }
    }

    /// The value ids that have gone stale and should be re-requested, with
    /// `now` recorded as their new `last-request-monotonic`.
    pub fn fields_needing_request(&mut self, now: Monotonic) -> Vec<u16> {
        let mut due = Vec::new();
        for (idx, field) in self.fields.iter_mut().enumerate() {
            let stale = !field.seen
                || now.saturating_sub(field.last_update_monotonic) > FIELD_MAX_AGE_MS;
            let can_ask_again = now.saturating_sub(field.last_request_monotonic) > FIELD_MAX_AGE_MS;
            if stale && can_ask_again {
                field.last_request_monotonic = now;
                due.push(FIELD_IDS[idx]);
            }
        }
        due
    }

    /// The current wall-clock time, projected forward from the last
    /// minute update by elapsed monotonic time. Returns `None` if not yet
    /// [`available`](Self::available).
    pub fn current(&self, now: Monotonic) -> Option<WallClock> {
        if !self.available() {
            return None;
        }
        let elapsed_ms = now.saturating_sub(self.last_minute_update_monotonic);
        let elapsed_minutes = elapsed_ms / 60_000;
        Some(self.last_minute_update.add_minutes(elapsed_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(source: &mut DateTimeSource, now: Monotonic) {
        source.on_sample(DATETIME_DAY_ID, 15, now);
        source.on_sample(DATETIME_MONTH_ID, 3, now);
        source.on_sample(DATETIME_YEAR_ID, 26, now);
        source.on_sample(DATETIME_HOUR_ID, 10, now);
        source.on_sample(DATETIME_MINUTE_ID, 59, now);
    }

    #[test]
    fn unavailable_until_all_five_fields_seen() {
        let mut source = DateTimeSource::new();
        source.on_sample(DATETIME_DAY_ID, 1, 0);
        assert!(!source.available());
        fill(&mut source, 0);
        assert!(source.available());
    }

    #[test]
    fn projects_forward_with_minute_carry() {
        let mut source = DateTimeSource::new();
        fill(&mut source, 0);
        // minute=59 + 2 minutes -> hour+1, minute=01
        let now = source.current(2 * 60_000).unwrap();
        assert_eq!(now.hour, 11);
        assert_eq!(now.minute, 1);
    }

    #[test]
    fn leap_year_day_carry() {
        let mut source = DateTimeSource::new();
        source.on_sample(DATETIME_DAY_ID, 28, 0);
        source.on_sample(DATETIME_MONTH_ID, 2, 0);
        source.on_sample(DATETIME_YEAR_ID, 24, 0); // 2024 is a leap year
        source.on_sample(DATETIME_HOUR_ID, 23, 0);
        source.on_sample(DATETIME_MINUTE_ID, 59, 0);
        let now = source.current(60_000).unwrap();
        assert_eq!(now.month, 2);
        assert_eq!(now.day, 29);
    }

    #[test]
    fn stale_fields_flagged_for_request() {
        let mut source = DateTimeSource::new();
        fill(&mut source, 0);
        let due = source.fields_needing_request(FIELD_MAX_AGE_MS + 1);
        assert_eq!(due.len(), FIELD_COUNT);
    }
}
