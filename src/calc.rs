use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

/// Fee bands from the settings row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSchedule {
    pub base_monthly_fee: f64,
    pub toddler_fee: f64,
    pub preschool_fee: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            base_monthly_fee: 600.0,
            toddler_fee: 500.0,
            preschool_fee: 650.0,
        }
    }
}

impl FeeSchedule {
    pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
        conn.query_row(
            "SELECT base_monthly_fee, toddler_fee, preschool_fee FROM settings WHERE id = 1",
            [],
            |r| {
                Ok(Self {
                    base_monthly_fee: r.get(0)?,
                    toddler_fee: r.get(1)?,
                    preschool_fee: r.get(2)?,
                })
            },
        )
    }
}

pub const TODDLER_MAX_AGE: i32 = 3;
pub const PRESCHOOL_MAX_AGE: i32 = 6;

/// Whole years between `dob` and `today`. The year only counts once the
/// birthday anniversary has been reached; a Feb 29 birthday rolls over on Mar 1
/// in non-leap years.
pub fn age_in_years(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

pub fn monthly_fee(dob: Option<NaiveDate>, schedule: &FeeSchedule, today: NaiveDate) -> f64 {
    let Some(dob) = dob else {
        return schedule.base_monthly_fee;
    };
    let age = age_in_years(dob, today);
    if age <= TODDLER_MAX_AGE {
        schedule.toddler_fee
    } else if age <= PRESCHOOL_MAX_AGE {
        schedule.preschool_fee
    } else {
        schedule.base_monthly_fee
    }
}

/// Approximate age used by the roster report: elapsed days / 365.25, truncated.
pub fn approx_age(dob: NaiveDate, today: NaiveDate) -> i64 {
    let days = (today - dob).num_days();
    if days <= 0 {
        return 0;
    }
    (days as f64 / 365.25) as i64
}

/// Half-up rounding to one decimal place.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

pub fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * part as f64 / total as f64
}
