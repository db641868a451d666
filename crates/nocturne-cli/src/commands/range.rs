use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use nocturne_core::config::Config;
use nocturne_core::reduce::reduce_range;

use crate::summary::{print_night_summary, print_range_totals};

#[derive(Args)]
pub struct RangeArgs {
    /// First night, YYYY-MM-DD
    pub start: String,

    /// Last night (inclusive), YYYY-MM-DD
    pub end: String,

    /// Telescope tag (C28, C18, 1m)
    pub telescope: String,
}

pub fn run(args: &RangeArgs, config: &Config) -> Result<()> {
    let telescope = super::parse_telescope(&args.telescope)?;
    let start = parse_iso_date(&args.start)?;
    let end = parse_iso_date(&args.end)?;
    if end < start {
        return Err(anyhow!("range end {end} before start {start}"));
    }

    let nights = (end - start).num_days() as u64 + 1;
    let pb = ProgressBar::new(nights);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:10} [{bar:40}] {pos}/{len} nights")?
            .progress_chars("=> "),
    );
    pb.set_message(telescope.to_string());

    let summaries = reduce_range(config, telescope, start, end, |summary| {
        pb.suspend(|| print_night_summary(summary));
        pb.inc(1);
    })?;
    pb.finish();

    print_range_totals(&summaries);
    Ok(())
}

fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date {s}"))
}
