//! Night reduction orchestrator.
//!
//! For each night: build or reuse every group's masters first, then resolve
//! the bias/dark/flat triplet per detector group and filter, and apply the
//! calibration chain to each matching light frame. Data-availability
//! problems (missing folders, missing frames, missing masters) degrade to
//! logged skips; configuration problems and I/O failures propagate.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::archive::{ArchiveKey, FsArchive, MasterResolver};
use crate::combine::{divide, subtract, subtract_scaled};
use crate::config::Config;
use crate::error::{NocturneError, Result};
use crate::frame::{output_stem, FrameRecord, FrameType, MasterFrame, ReducedFrame};
use crate::grouping::group_by_detector;
use crate::io::store::{file_name, load_night, read_master, write_master, write_reduced};
use crate::keywords::Telescope;
use crate::master::{build_master_bias, build_master_dark, build_master_flat, SynthesisOptions};
use crate::timecorr::correction_for;

/// Night-level result classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NightStatus {
    Completed,
    MissingNightFolder,
    NoScienceFrames,
}

/// Why one (group, filter) unit of work was skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    MissingBias,
    MissingDark,
    MissingFlat,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBias => write!(f, "no master bias"),
            Self::MissingDark => write!(f, "no master dark"),
            Self::MissingFlat => write!(f, "no master flat"),
        }
    }
}

/// Outcome of one (detector group, filter) unit of work.
#[derive(Clone, Debug)]
pub enum UnitOutcome {
    Reduced {
        config_str: String,
        filter: String,
        written: usize,
        /// Outputs left untouched because they already existed.
        kept_existing: usize,
    },
    Skipped {
        config_str: String,
        filter: String,
        reason: SkipReason,
    },
}

#[derive(Clone, Debug)]
pub struct NightSummary {
    pub telescope: Telescope,
    pub date: NaiveDate,
    pub status: NightStatus,
    pub units: Vec<UnitOutcome>,
}

impl NightSummary {
    fn new(telescope: Telescope, date: NaiveDate) -> Self {
        Self {
            telescope,
            date,
            status: NightStatus::Completed,
            units: Vec::new(),
        }
    }

    /// Total reduced frames written this night.
    pub fn written(&self) -> usize {
        self.units
            .iter()
            .map(|u| match u {
                UnitOutcome::Reduced { written, .. } => *written,
                UnitOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn skipped_units(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u, UnitOutcome::Skipped { .. }))
            .count()
    }
}

fn synthesis_options(config: &Config) -> SynthesisOptions {
    SynthesisOptions {
        max_num_frames: config.cal.max_num_frames,
        preserve_uncertainty: config.general.save_uncertainty,
    }
}

/// Build (or reuse) all master calibration frames for one night.
///
/// A missing night folder or an empty inventory is a warning, not an error.
pub fn create_masters(config: &Config, telescope: Telescope, date: NaiveDate) -> Result<()> {
    let night_dir = config.night_dir(telescope, date)?;
    if !night_dir.is_dir() {
        warn!(dir = %night_dir.display(), "night folder does not exist");
        return Ok(());
    }
    let frames = load_night(&night_dir, telescope)?;
    if frames.is_empty() {
        warn!(date = %date.format("%Y%m%d"), "no images taken");
        return Ok(());
    }
    build_masters(config, telescope, date, &frames)
}

fn build_masters(
    config: &Config,
    telescope: Telescope,
    date: NaiveDate,
    frames: &[FrameRecord],
) -> Result<()> {
    let instrument = frames[0].instrument.clone();
    let opts = synthesis_options(config);
    let archive = FsArchive::new(&config.cal.path, telescope);
    archive.ensure_dir()?;
    let resolver = MasterResolver::new(&archive, config.cal.max_day_shift);

    for (detector, indices) in group_by_detector(frames) {
        let config_str = detector.config_str();
        debug!(%config_str, frames = indices.len(), "synthesizing masters for detector group");

        let select = |frame_type: FrameType, filter: Option<&str>| -> Vec<&FrameRecord> {
            indices
                .iter()
                .map(|&i| &frames[i])
                .filter(|f| {
                    f.frame_type == frame_type
                        && (filter.is_none() || f.filter.as_deref() == filter)
                })
                .collect()
        };
        let key = |role: FrameType, filter: Option<&str>| ArchiveKey {
            role,
            telescope,
            instrument: instrument.clone(),
            date,
            config_str: config_str.clone(),
            filter: filter.map(str::to_string),
        };

        let bias_key = key(FrameType::Bias, None);
        let bias = build_or_reuse(config, &archive, &resolver, &bias_key, || {
            build_master_bias(&select(FrameType::Bias, None), &opts)
        })?;

        let dark_key = key(FrameType::Dark, None);
        let dark = build_or_reuse(config, &archive, &resolver, &dark_key, || {
            build_master_dark(&select(FrameType::Dark, None), &bias, &opts)
        })?;

        let filters: BTreeSet<String> = indices
            .iter()
            .map(|&i| &frames[i])
            .filter(|f| f.frame_type == FrameType::Flat)
            .filter_map(|f| f.filter.clone())
            .collect();

        for filter in &filters {
            let flat_key = key(FrameType::Flat, Some(filter.as_str()));
            let path = archive.path_for(&flat_key);
            if path.is_file() && !config.cal.overwrite {
                debug!(%filter, "master flat exists, skipping");
                continue;
            }
            let raw_flats = select(FrameType::Flat, Some(filter.as_str()));
            if let Some(master) = build_master_flat(&raw_flats, &bias, &dark, &opts)? {
                write_master(&path, &master, telescope, &instrument, Some(filter.as_str()))?;
                info!(file = %path.display(), "master flat saved");
            }
        }
    }
    Ok(())
}

/// Build a master unless a usable one is already archived for the exact
/// date; on an empty result, fall back to the nearest archived neighbor.
fn build_or_reuse(
    config: &Config,
    archive: &FsArchive,
    resolver: &MasterResolver<'_>,
    key: &ArchiveKey,
    builder: impl FnOnce() -> Result<MasterFrame>,
) -> Result<MasterFrame> {
    let path = archive.path_for(key);
    let master = if !path.is_file() || config.cal.overwrite {
        let master = builder()?;
        if !master.is_empty() {
            write_master(&path, &master, key.telescope, &key.instrument, key.filter.as_deref())?;
            info!(file = %path.display(), "master {} saved", key.role);
        }
        master
    } else {
        debug!(file = %path.display(), "master {} exists, reusing", key.role);
        read_master(&path, key.role)?
    };

    // A master with zero content triggers the day-shift fallback no matter
    // where it came from.
    if master.is_empty() {
        if let Some(archival) = resolver.resolve(key) {
            info!(file = %archival.display(), "using archival master {}", key.role);
            return read_master(&archival, key.role);
        }
        warn!(
            "no archival master {} within {} days of {}",
            key.role,
            config.cal.max_day_shift,
            key.date.format("%Y%m%d")
        );
    }
    Ok(master)
}

/// Reduce one night: masters first, then the calibration chain over every
/// light frame per detector group and filter.
pub fn reduce_night(config: &Config, telescope: Telescope, date: NaiveDate) -> Result<NightSummary> {
    let mut summary = NightSummary::new(telescope, date);

    let night_dir = config.night_dir(telescope, date)?;
    if !night_dir.is_dir() {
        warn!(dir = %night_dir.display(), "night folder does not exist");
        summary.status = NightStatus::MissingNightFolder;
        return Ok(summary);
    }

    info!(
        telescope = %telescope,
        date = %date.format("%Y%m%d"),
        "creating master calibration frames"
    );
    let frames = load_night(&night_dir, telescope)?;
    if frames.is_empty() {
        warn!(date = %date.format("%Y%m%d"), "no images taken");
        summary.status = NightStatus::NoScienceFrames;
        return Ok(summary);
    }
    // Hard ordering barrier: every master for the night exists (or has been
    // ruled out) before any light frame is touched.
    build_masters(config, telescope, date, &frames)?;

    if !frames.iter().any(|f| f.frame_type == FrameType::Light) {
        warn!(date = %date.format("%Y%m%d"), "no science frames");
        summary.status = NightStatus::NoScienceFrames;
        return Ok(summary);
    }

    let instrument = frames[0].instrument.clone();
    let reduced_dir = config.reduced_dir(&night_dir);
    std::fs::create_dir_all(&reduced_dir)?;

    let archive = FsArchive::new(&config.cal.path, telescope);
    let resolver = MasterResolver::new(&archive, config.cal.max_day_shift);

    for (detector, indices) in group_by_detector(&frames) {
        let config_str = detector.config_str();
        let group_lights: Vec<&FrameRecord> = indices
            .iter()
            .map(|&i| &frames[i])
            .filter(|f| f.frame_type == FrameType::Light)
            .collect();
        if group_lights.is_empty() {
            continue;
        }

        let filters: BTreeSet<String> = group_lights
            .iter()
            .filter_map(|f| f.filter.clone())
            .collect();

        for filter in &filters {
            let key = |role: FrameType, filt: Option<&str>| ArchiveKey {
                role,
                telescope,
                instrument: instrument.clone(),
                date,
                config_str: config_str.clone(),
                filter: filt.map(str::to_string),
            };

            let triplet = resolve_triplet(&resolver, &key, filter);
            let (bias_path, dark_path, flat_path) = match triplet {
                Ok(paths) => paths,
                Err(reason) => {
                    warn!(%config_str, %filter, %reason, "no calibration frames found, skipping");
                    summary.units.push(UnitOutcome::Skipped {
                        config_str: config_str.clone(),
                        filter: filter.clone(),
                        reason,
                    });
                    continue;
                }
            };

            let bias = read_master(&bias_path, FrameType::Bias)?;
            let dark = read_master(&dark_path, FrameType::Dark)?;
            let flat = read_master(&flat_path, FrameType::Flat)?;

            let mut written = 0;
            let mut kept_existing = 0;
            for light in group_lights
                .iter()
                .filter(|f| f.filter.as_deref() == Some(filter.as_str()))
            {
                let (julian_date, time_correction) =
                    match correction_for(telescope, light.readout_mode.as_deref()) {
                        Some(corr) => {
                            (light.julian_date + corr.offset_days(), Some(corr.comment.to_string()))
                        }
                        None => (light.julian_date, None),
                    };
                let object = light.object.clone().unwrap_or_default();
                let stem = output_stem(&object, julian_date, filter, telescope);
                let out_path = reduced_dir.join(format!("{stem}.fits"));
                if out_path.is_file() && !config.general.overwrite {
                    debug!(file = %out_path.display(), "reduced frame exists, skipping");
                    kept_existing += 1;
                    continue;
                }

                let data = subtract(&light.data, &bias.data)?;
                let ratio = exposure_ratio(light.exposure, dark.exposure);
                let data = subtract_scaled(&data, &dark.data, ratio)?;
                let data = divide(&data, &flat.data)?;

                let reduced = ReducedFrame {
                    object,
                    julian_date,
                    filter: filter.clone(),
                    telescope,
                    instrument: instrument.clone(),
                    exposure: light.exposure,
                    data,
                    debias: file_name(&bias_path),
                    dedark: file_name(&dark_path),
                    deflat: file_name(&flat_path),
                    time_correction,
                };
                write_reduced(&out_path, &reduced)?;
                debug!(file = %out_path.display(), "reduced frame saved");
                written += 1;
            }

            summary.units.push(UnitOutcome::Reduced {
                config_str: config_str.clone(),
                filter: filter.clone(),
                written,
                kept_existing,
            });
        }
    }

    info!(
        written = summary.written(),
        skipped_units = summary.skipped_units(),
        "night reduction finished"
    );
    Ok(summary)
}

fn resolve_triplet(
    resolver: &MasterResolver<'_>,
    key: &dyn Fn(FrameType, Option<&str>) -> ArchiveKey,
    filter: &str,
) -> std::result::Result<(PathBuf, PathBuf, PathBuf), SkipReason> {
    let bias = resolver
        .resolve(&key(FrameType::Bias, None))
        .ok_or(SkipReason::MissingBias)?;
    let dark = resolver
        .resolve(&key(FrameType::Dark, None))
        .ok_or(SkipReason::MissingDark)?;
    let flat = resolver
        .resolve(&key(FrameType::Flat, Some(filter)))
        .ok_or(SkipReason::MissingFlat)?;
    Ok((bias, dark, flat))
}

fn exposure_ratio(light_exposure: f64, dark_exposure: f64) -> f32 {
    if dark_exposure > 0.0 {
        (light_exposure / dark_exposure) as f32
    } else {
        light_exposure as f32
    }
}

/// Reduce every night in `[start, end]`, calling `on_night` after each.
/// Nights that are missing or empty are skipped, never aborting the range.
pub fn reduce_range<F>(
    config: &Config,
    telescope: Telescope,
    start: NaiveDate,
    end: NaiveDate,
    mut on_night: F,
) -> Result<Vec<NightSummary>>
where
    F: FnMut(&NightSummary),
{
    if end < start {
        return Err(NocturneError::InvalidDate(format!(
            "range end {end} before start {start}"
        )));
    }
    let mut summaries = Vec::new();
    let mut date = start;
    while date <= end {
        let summary = reduce_night(config, telescope, date)?;
        on_night(&summary);
        summaries.push(summary);
        date += Duration::days(1);
    }
    Ok(summaries)
}
