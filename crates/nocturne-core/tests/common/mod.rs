use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ndarray::Array2;
use nocturne_core::config::Config;
use nocturne_core::io::fits::{write_fits, CardValue, FitsHeader};

/// Synthetic raw exposure description for test nights.
pub struct RawFrame<'a> {
    pub image_type: &'a str,
    pub exposure: f64,
    pub filter: Option<&'a str>,
    pub object: Option<&'a str>,
    pub julian_date: f64,
    pub readout_mode: Option<&'a str>,
    /// Constant pixel value across the frame.
    pub value: f32,
}

impl Default for RawFrame<'_> {
    fn default() -> Self {
        Self {
            image_type: "BIAS",
            exposure: 0.0,
            filter: None,
            object: None,
            julian_date: 2_459_000.5,
            readout_mode: None,
            value: 0.0,
        }
    }
}

/// Write a uniform 4x4 raw frame with C28-style headers.
pub fn write_raw_frame(path: &Path, frame: &RawFrame<'_>) {
    let mut header = FitsHeader::new();
    header.set("IMAGETYP", CardValue::Text(frame.image_type.to_string()));
    header.set("TELESCOP", CardValue::Text("C28".to_string()));
    header.set("INSTRUME", CardValue::Text("FLI-PL16801".to_string()));
    header.set("EXPTIME", CardValue::Real(frame.exposure));
    header.set("JD", CardValue::Real(frame.julian_date));
    header.set("XORGSUBF", CardValue::Integer(0));
    header.set("YORGSUBF", CardValue::Integer(0));
    header.set("XBINNING", CardValue::Integer(1));
    header.set("YBINNING", CardValue::Integer(1));
    if let Some(filter) = frame.filter {
        header.set("FILTER", CardValue::Text(filter.to_string()));
    }
    if let Some(object) = frame.object {
        header.set("OBJECT", CardValue::Text(object.to_string()));
    }
    if let Some(mode) = frame.readout_mode {
        header.set("READOUTM", CardValue::Text(mode.to_string()));
    }

    let data = Array2::from_elem((4, 4), frame.value);
    write_fits(path, &header, &data).expect("write raw frame");
}

/// Config rooted inside a temp directory: raw frames under `raw/c28/`,
/// calibration archive under `cal/`.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::example();
    config.general.path = root.join("raw");
    config.cal.path = root.join("cal");
    config.cal.max_day_shift = 3;
    config
}

/// Create (if needed) and return the C28 night directory for a date.
pub fn night_dir(root: &Path, date: NaiveDate) -> PathBuf {
    let dir = root
        .join("raw")
        .join("c28")
        .join(date.format("%Y%m%d").to_string());
    std::fs::create_dir_all(&dir).expect("create night dir");
    dir
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}
