use anyhow::Result;
use clap::Args;
use nocturne_core::config::Config;
use nocturne_core::reduce::create_masters;

#[derive(Args)]
pub struct MastersArgs {
    /// Year of the night
    pub year: i32,

    /// Month (1-12)
    pub month: u32,

    /// Day of month
    pub day: u32,

    /// Telescope tag (C28, C18, 1m)
    pub telescope: String,
}

pub fn run(args: &MastersArgs, config: &Config) -> Result<()> {
    let telescope = super::parse_telescope(&args.telescope)?;
    let date = super::parse_date(args.year, args.month, args.day)?;

    create_masters(config, telescope, date)?;
    println!(
        "Master calibration frames for {} {} are up to date",
        telescope,
        date.format("%Y%m%d")
    );
    Ok(())
}
