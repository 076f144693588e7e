//! Calendar month a target applies to
use std::fmt;

use crate::error::ValidationError;
use crate::timestamp::TimeStamp;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, minicbor::Encode, minicbor::Decode)]
pub struct Period {
    #[n(0)]
    month: u32,
    #[n(1)]
    year: i32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::InvalidMonth(month.to_string()));
        }
        if !(1000..=9999).contains(&year) {
            return Err(ValidationError::InvalidYear(year.to_string()));
        }
        Ok(Self { month, year })
    }

    /// Accepts `6`, `06`, `June` or `jun` for the month and a four digit year.
    pub fn parse(month: &str, year: &str) -> Result<Self, ValidationError> {
        let month = parse_month(month)?;
        let trimmed = year.trim();
        if trimmed.len() != 4 {
            return Err(ValidationError::InvalidYear(year.to_string()));
        }
        let year = trimmed
            .parse::<i32>()
            .map_err(|_| ValidationError::InvalidYear(year.to_string()))?;
        Self::new(month, year)
    }

    pub fn current() -> Self {
        Self::containing(&TimeStamp::new())
    }

    pub fn containing(ts: &TimeStamp<chrono::Utc>) -> Self {
        Self {
            month: ts.month(),
            year: ts.year(),
        }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }
}

fn parse_month(raw: &str) -> Result<u32, ValidationError> {
    let value = raw.trim();
    if let Ok(number) = value.parse::<u32>() {
        return match number {
            1..=12 => Ok(number),
            _ => Err(ValidationError::InvalidMonth(raw.to_string())),
        };
    }

    let lower = value.to_ascii_lowercase();
    if lower.len() >= 3 {
        for (idx, name) in MONTHS.iter().enumerate() {
            if name.starts_with(&lower) {
                return Ok(idx as u32 + 1);
            }
        }
    }
    Err(ValidationError::InvalidMonth(raw.to_string()))
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
