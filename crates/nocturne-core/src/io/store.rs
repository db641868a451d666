//! Frame store: reading raw exposures into `FrameRecord`s and persisting
//! masters and reduced frames, translating headers through the metadata
//! adapter.

use std::path::Path;

use tracing::debug;

use crate::error::{NocturneError, Result};
use crate::frame::{DetectorConfig, FrameRecord, FrameType, MasterFrame, ReducedFrame};
use crate::io::fits::{read_fits, write_fits, CardValue, FitsHeader};
use crate::keywords::Telescope;

/// Read one raw exposure. Returns `Ok(None)` when the file's image type is
/// not one the pipeline processes (focus frames, test exposures, ...).
pub fn read_frame_record(path: &Path, telescope: Telescope) -> Result<Option<FrameRecord>> {
    let img = read_fits(path)?;
    let h = &img.header;
    let k = telescope.keys();

    let image_type = match h.text(k.image_type) {
        Some(s) => s,
        None => {
            debug!(path = %path.display(), "no image type card, skipping");
            return Ok(None);
        }
    };
    let frame_type = match telescope.frame_type_for(image_type) {
        Some(t) => t,
        None => {
            debug!(path = %path.display(), image_type, "unhandled image type, skipping");
            return Ok(None);
        }
    };

    let missing = |key: &str| NocturneError::MissingHeaderKey {
        key: key.to_string(),
        path: path.to_path_buf(),
    };
    let geometry = |key: &str| -> Result<u32> {
        let v = h.integer(key).ok_or_else(|| missing(key))?;
        u32::try_from(v).map_err(|_| NocturneError::InvalidHeaderValue {
            key: key.to_string(),
            path: path.to_path_buf(),
            value: v.to_string(),
        })
    };

    let detector = DetectorConfig {
        x_size: img.data.ncols() as u32,
        y_size: img.data.nrows() as u32,
        x_origin: geometry(k.x_origin)?,
        y_origin: geometry(k.y_origin)?,
        x_bin: geometry(k.x_bin)?,
        y_bin: geometry(k.y_bin)?,
    };

    let exposure = h.real(k.exposure).ok_or_else(|| missing(k.exposure))?;
    let instrument = h
        .text(k.instrument)
        .ok_or_else(|| missing(k.instrument))?
        .to_string();

    let julian_date = k.julian_date.iter().find_map(|key| h.real(key));
    let julian_date = match julian_date {
        Some(jd) => jd,
        None if frame_type == FrameType::Light => return Err(missing(k.julian_date[0])),
        None => 0.0,
    };

    let filter = h.text(k.filter).map(str::to_string);
    if filter.is_none() && matches!(frame_type, FrameType::Flat | FrameType::Light) {
        return Err(missing(k.filter));
    }

    let object = h.text(k.object).map(str::to_string);
    if object.is_none() && frame_type == FrameType::Light {
        return Err(missing(k.object));
    }

    let readout_mode = k
        .readout_mode
        .and_then(|key| h.text(key))
        .map(str::to_string);

    Ok(Some(FrameRecord {
        frame_type,
        telescope,
        instrument,
        exposure,
        filter,
        object,
        julian_date,
        readout_mode,
        detector,
        data: img.data,
        path: path.to_path_buf(),
    }))
}

/// Load a night's raw-frame inventory from a directory, in filename order.
///
/// Files without a recognized image type are skipped; unreadable FITS files
/// and missing required headers propagate as errors.
pub fn load_night(dir: &Path, telescope: Telescope) -> Result<Vec<FrameRecord>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("fits") || e.eq_ignore_ascii_case("fit"))
        })
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in &paths {
        if let Some(record) = read_frame_record(path, telescope)? {
            frames.push(record);
        }
    }
    Ok(frames)
}

/// Persist a master frame. Empty masters are never written; callers signal
/// their absence by not producing a file at all.
pub fn write_master(
    path: &Path,
    master: &MasterFrame,
    telescope: Telescope,
    instrument: &str,
    filter: Option<&str>,
) -> Result<()> {
    debug_assert!(!master.is_empty());

    let mut header = FitsHeader::new();
    header.set(
        "IMAGETYP",
        CardValue::Text(telescope.type_value(master.frame_type).to_string()),
    );
    header.set("TELESCOP", CardValue::Text(telescope.to_string()));
    header.set("INSTRUME", CardValue::Text(instrument.to_string()));
    header.set_with_comment(
        "EXPTIME",
        CardValue::Real(master.exposure),
        Some("effective exposure [s]"),
    );
    if let Some(filt) = filter {
        header.set("FILTER", CardValue::Text(filt.to_string()));
    }
    header.set_with_comment(
        "NCOMB",
        CardValue::Integer(master.provenance.len() as i64),
        Some("number of combined frames"),
    );
    for (i, src) in master.provenance.iter().enumerate() {
        header.set(&format!("PROV{}", i + 1), CardValue::Text(src.clone()));
    }

    write_fits(path, &header, &master.data)?;

    if let Some(ref unc) = master.uncertainty {
        write_fits(&uncertainty_path(path), &header, unc)?;
    }
    Ok(())
}

/// Sidecar path for the uncertainty plane: `Bias_x.fits` -> `Bias_x_unc.fits`.
fn uncertainty_path(path: &Path) -> std::path::PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("master");
    path.with_file_name(format!("{stem}_unc.fits"))
}

/// Load an archived master. Provenance records the archived file itself.
pub fn read_master(path: &Path, frame_type: FrameType) -> Result<MasterFrame> {
    let img = read_fits(path)?;
    let exposure = img.header.real("EXPTIME").unwrap_or(1.0);
    let provenance = vec![file_name(path)];
    Ok(MasterFrame {
        frame_type,
        data: img.data,
        uncertainty: None,
        exposure,
        provenance,
    })
}

/// Persist a reduced light frame with its calibration provenance.
pub fn write_reduced(path: &Path, reduced: &ReducedFrame) -> Result<()> {
    let t = reduced.telescope;
    let mut header = FitsHeader::new();
    header.set(
        "IMAGETYP",
        CardValue::Text(t.type_value(FrameType::Light).to_string()),
    );
    header.set("OBJECT", CardValue::Text(reduced.object.clone()));
    header.set("TELESCOP", CardValue::Text(t.to_string()));
    header.set("INSTRUME", CardValue::Text(reduced.instrument.clone()));
    header.set("FILTER", CardValue::Text(reduced.filter.clone()));
    header.set_with_comment("EXPTIME", CardValue::Real(reduced.exposure), Some("[s]"));
    header.set_with_comment("JD", CardValue::Real(reduced.julian_date), Some("Julian date"));
    header.set_with_comment(
        "DEBIAS",
        CardValue::Text(reduced.debias.clone()),
        Some("master bias"),
    );
    header.set_with_comment(
        "DEDARK",
        CardValue::Text(reduced.dedark.clone()),
        Some("master dark"),
    );
    header.set_with_comment(
        "DEFLAT",
        CardValue::Text(reduced.deflat.clone()),
        Some("master flat"),
    );
    if let Some(ref comment) = reduced.time_correction {
        header.set_with_comment("TIMECORR", CardValue::Logical(true), Some(comment));
    }
    write_fits(path, &header, &reduced.data)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}
