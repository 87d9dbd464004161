//! Exchange session calendar
//!
//! The trading day has a lunch break: morning 09:30-11:30, afternoon 13:00-15:00.
//! Bars before noon belong to the morning block, everything else to the afternoon.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Minutes since midnight of the morning open (09:30)
pub const MORNING_OPEN: u32 = 9 * 60 + 30;
/// Minutes since midnight of the morning close (11:30)
pub const MORNING_CLOSE: u32 = 11 * 60 + 30;
/// Minutes since midnight of the afternoon open (13:00)
pub const AFTERNOON_OPEN: u32 = 13 * 60;
/// Minutes since midnight of the afternoon close (15:00)
pub const AFTERNOON_CLOSE: u32 = 15 * 60;

const BLOCK_SPLIT: u32 = 12 * 60;

/// One contiguous trading block of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionBlock {
    Morning,
    Afternoon,
}

impl SessionBlock {
    pub fn of(ts: NaiveDateTime) -> Self {
        if minute_of_day(ts) < BLOCK_SPLIT {
            SessionBlock::Morning
        } else {
            SessionBlock::Afternoon
        }
    }

    /// Block open as minutes since midnight
    pub fn open_minute(self) -> u32 {
        match self {
            SessionBlock::Morning => MORNING_OPEN,
            SessionBlock::Afternoon => AFTERNOON_OPEN,
        }
    }

    /// Block open on the given date
    pub fn open_on(self, date: NaiveDate) -> NaiveDateTime {
        midnight(date) + Duration::minutes(i64::from(self.open_minute()))
    }
}

/// Start of the calendar date
#[inline]
pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    NaiveDateTime::new(date, NaiveTime::default())
}

/// Minutes elapsed since midnight
#[inline]
pub fn minute_of_day(ts: NaiveDateTime) -> u32 {
    ts.hour() * 60 + ts.minute()
}

/// Whether two base bars are adjacent in the same block of the same day
/// but more than one minute apart
pub fn is_intrablock_gap(prev: NaiveDateTime, curr: NaiveDateTime) -> bool {
    prev.date() == curr.date()
        && SessionBlock::of(prev) == SessionBlock::of(curr)
        && curr - prev > Duration::minutes(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_blocks() {
        assert_eq!(SessionBlock::of(at(9, 31)), SessionBlock::Morning);
        assert_eq!(SessionBlock::of(at(11, 30)), SessionBlock::Morning);
        assert_eq!(SessionBlock::of(at(13, 1)), SessionBlock::Afternoon);
        assert_eq!(
            SessionBlock::Afternoon.open_on(at(0, 0).date()),
            at(13, 0)
        );
    }

    #[test]
    fn test_lunch_break_is_not_a_gap() {
        assert!(!is_intrablock_gap(at(11, 30), at(13, 1)));
        assert!(!is_intrablock_gap(at(10, 0), at(10, 1)));
        assert!(is_intrablock_gap(at(10, 0), at(10, 5)));
    }
}
