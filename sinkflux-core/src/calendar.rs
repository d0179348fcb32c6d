//! Calendar conventions used to turn flux rates into per-step totals
//!
//! The historical convention is a fixed 365-day year with a 28-day February.
//! It never adjusts for leap years; [`CalendarPolicy::LeapAware`] is available
//! when that is explicitly wanted.

use crate::timeseries::{FloatValue, TimeKey};
use serde::{Deserialize, Serialize};

const FIXED_MONTH_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

const SECONDS_PER_DAY: FloatValue = 86400.0;

/// How month and year lengths are counted
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalendarPolicy {
    /// Fixed 28/30/31-day months and 365-day years
    #[default]
    Fixed365,
    /// Gregorian leap years (29-day February, 366-day year)
    LeapAware,
}

impl CalendarPolicy {
    /// Length of `month` (1-based); months outside `1..=12` have no days
    pub fn days_in_month(&self, year: i32, month: u32) -> u32 {
        let Some(&days) = month
            .checked_sub(1)
            .and_then(|index| FIXED_MONTH_DAYS.get(index as usize))
        else {
            return 0;
        };
        match self {
            CalendarPolicy::LeapAware if month == 2 && is_leap_year(year) => days + 1,
            _ => days,
        }
    }

    pub fn days_in_year(&self, year: i32) -> u32 {
        match self {
            CalendarPolicy::LeapAware if is_leap_year(year) => 366,
            _ => 365,
        }
    }

    /// Number of days covered by one sample at `key`
    pub fn days_in_step(&self, key: TimeKey) -> u32 {
        match key {
            TimeKey::Month { year, month } => self.days_in_month(year, month),
            TimeKey::Year(year) => self.days_in_year(year),
        }
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Time unit in which a gridded flux rate is expressed
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FluxRate {
    /// Annualised rate stored per step; a month contributes `days / 365`
    #[default]
    PerYear,
    /// Daily rate; a step contributes `days`
    PerDay,
    /// Per-second rate (e.g. kg m⁻² s⁻¹); a step contributes `days * 86400`
    PerSecond,
    /// The value already is the total for the step
    PerStep,
}

impl FluxRate {
    /// Factor converting a rate at `key` into the total over that step
    pub fn step_factor(&self, calendar: CalendarPolicy, key: TimeKey) -> FloatValue {
        let days = calendar.days_in_step(key) as FloatValue;
        match self {
            FluxRate::PerYear => days / calendar.days_in_year(key.year()) as FloatValue,
            FluxRate::PerDay => days,
            FluxRate::PerSecond => days * SECONDS_PER_DAY,
            FluxRate::PerStep => 1.0,
        }
    }
}
