pub mod config;
pub mod masters;
pub mod night;
pub mod range;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use nocturne_core::keywords::Telescope;

pub(crate) fn parse_telescope(tag: &str) -> Result<Telescope> {
    tag.parse::<Telescope>()
        .map_err(|e| anyhow!("{e} (supported: C28, C18, 1m)"))
}

pub(crate) fn parse_date(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| anyhow!("invalid date {year}-{month}-{day}"))
}
