use anyhow::Result;
use clap::Args;
use nocturne_core::config::Config;
use nocturne_core::reduce::reduce_night;

use crate::summary::print_night_summary;

#[derive(Args)]
pub struct NightArgs {
    /// Year of the night to reduce
    pub year: i32,

    /// Month (1-12)
    pub month: u32,

    /// Day of month
    pub day: u32,

    /// Telescope tag (C28, C18, 1m)
    pub telescope: String,
}

pub fn run(args: &NightArgs, config: &Config) -> Result<()> {
    let telescope = super::parse_telescope(&args.telescope)?;
    let date = super::parse_date(args.year, args.month, args.day)?;

    let summary = reduce_night(config, telescope, date)?;
    print_night_summary(&summary);
    Ok(())
}
