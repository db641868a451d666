//! Frame metadata adapter: maps logical metadata fields to the physical
//! FITS header keys and values each telescope writes.
//!
//! Supported telescopes form a closed set; each carries a fixed key table,
//! so a lookup can never miss at runtime. Only parsing an unknown telescope
//! tag can fail.

use std::fmt;
use std::str::FromStr;

use crate::error::NocturneError;
use crate::frame::FrameType;

/// Supported telescopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Telescope {
    C28,
    C18,
    OneMeter,
}

impl fmt::Display for Telescope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::C28 => write!(f, "C28"),
            Self::C18 => write!(f, "C18"),
            Self::OneMeter => write!(f, "1m"),
        }
    }
}

impl FromStr for Telescope {
    type Err = NocturneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "C28" | "c28" => Ok(Self::C28),
            "C18" | "c18" => Ok(Self::C18),
            "1m" | "1M" => Ok(Self::OneMeter),
            other => Err(NocturneError::UnsupportedTelescope(other.to_string())),
        }
    }
}

/// Logical metadata fields the pipeline reads from raw frame headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalField {
    ExposureTime,
    Filter,
    ImageType,
    Object,
    JulianDate,
    ReadoutMode,
    Instrument,
    TelescopeName,
    XSize,
    YSize,
    XOrigin,
    YOrigin,
    XBin,
    YBin,
}

/// Physical header keys for one telescope. Fields that several cameras
/// spell differently carry the accepted alternatives in priority order.
pub struct KeyTable {
    pub exposure: &'static str,
    pub filter: &'static str,
    pub image_type: &'static str,
    pub object: &'static str,
    pub julian_date: &'static [&'static str],
    pub readout_mode: Option<&'static str>,
    pub instrument: &'static str,
    pub telescope: &'static str,
    pub x_size: &'static str,
    pub y_size: &'static str,
    pub x_origin: &'static str,
    pub y_origin: &'static str,
    pub x_bin: &'static str,
    pub y_bin: &'static str,
}

/// Physical IMAGETYP values for one telescope, matched case-insensitively.
/// The first entry of each list is the canonical value written to output.
pub struct ValueTable {
    pub light: &'static [&'static str],
    pub bias: &'static [&'static str],
    pub dark: &'static [&'static str],
    pub flat: &'static [&'static str],
}

static C28_KEYS: KeyTable = KeyTable {
    exposure: "EXPTIME",
    filter: "FILTER",
    image_type: "IMAGETYP",
    object: "OBJECT",
    julian_date: &["JD"],
    readout_mode: Some("READOUTM"),
    instrument: "INSTRUME",
    telescope: "TELESCOP",
    x_size: "NAXIS1",
    y_size: "NAXIS2",
    x_origin: "XORGSUBF",
    y_origin: "YORGSUBF",
    x_bin: "XBINNING",
    y_bin: "YBINNING",
};

static METER_KEYS: KeyTable = KeyTable {
    exposure: "EXPTIME",
    filter: "FILTER",
    image_type: "IMAGETYP",
    object: "OBJECT",
    julian_date: &["JD", "JUL-DATE"],
    readout_mode: None,
    instrument: "INSTRUME",
    telescope: "TELESCOP",
    x_size: "NAXIS1",
    y_size: "NAXIS2",
    x_origin: "XORGSUBF",
    y_origin: "YORGSUBF",
    x_bin: "XBINNING",
    y_bin: "YBINNING",
};

static C28_VALUES: ValueTable = ValueTable {
    light: &["LIGHT"],
    bias: &["BIAS"],
    dark: &["DARK"],
    flat: &["FLAT"],
};

static METER_VALUES: ValueTable = ValueTable {
    light: &["LightFrame", "SCIENCE"],
    bias: &["Bias Frame", "BIAS"],
    dark: &["Dark Frame", "DARK"],
    flat: &["Flat Field", "FLAT"],
};

impl Telescope {
    /// Header key table for this telescope. The C18 camera writes the same
    /// headers as the C28.
    pub fn keys(&self) -> &'static KeyTable {
        match self {
            Self::C28 | Self::C18 => &C28_KEYS,
            Self::OneMeter => &METER_KEYS,
        }
    }

    pub fn values(&self) -> &'static ValueTable {
        match self {
            Self::C28 | Self::C18 => &C28_VALUES,
            Self::OneMeter => &METER_VALUES,
        }
    }

    /// Map a raw IMAGETYP header value to a frame type, or `None` for
    /// values the pipeline does not process.
    pub fn frame_type_for(&self, raw: &str) -> Option<FrameType> {
        let v = self.values();
        let raw = raw.trim();
        let matches = |accepted: &[&str]| accepted.iter().any(|a| a.eq_ignore_ascii_case(raw));
        if matches(v.light) {
            Some(FrameType::Light)
        } else if matches(v.bias) {
            Some(FrameType::Bias)
        } else if matches(v.dark) {
            Some(FrameType::Dark)
        } else if matches(v.flat) {
            Some(FrameType::Flat)
        } else {
            None
        }
    }

    /// Canonical IMAGETYP value for a frame type at this telescope.
    pub fn type_value(&self, frame_type: FrameType) -> &'static str {
        let v = self.values();
        match frame_type {
            FrameType::Light => v.light[0],
            FrameType::Bias => v.bias[0],
            FrameType::Dark => v.dark[0],
            FrameType::Flat => v.flat[0],
        }
    }
}

/// Primary physical header key for a logical field at a telescope.
///
/// Total over both enums: the supported telescopes are a closed set, each
/// with a complete key table. Fields with accepted alternates (`JulianDate`
/// on the 1m) return the primary spelling; the store tries the alternates.
pub fn key_for(field: LogicalField, telescope: Telescope) -> &'static str {
    let k = telescope.keys();
    match field {
        LogicalField::ExposureTime => k.exposure,
        LogicalField::Filter => k.filter,
        LogicalField::ImageType => k.image_type,
        LogicalField::Object => k.object,
        LogicalField::JulianDate => k.julian_date[0],
        LogicalField::ReadoutMode => k.readout_mode.unwrap_or(k.image_type),
        LogicalField::Instrument => k.instrument,
        LogicalField::TelescopeName => k.telescope,
        LogicalField::XSize => k.x_size,
        LogicalField::YSize => k.y_size,
        LogicalField::XOrigin => k.x_origin,
        LogicalField::YOrigin => k.y_origin,
        LogicalField::XBin => k.x_bin,
        LogicalField::YBin => k.y_bin,
    }
}
