use std::fmt;
use std::path::PathBuf;

use ndarray::Array2;

use crate::keywords::Telescope;

/// Classification of a raw exposure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameType {
    Bias,
    Dark,
    Flat,
    Light,
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bias => write!(f, "Bias"),
            Self::Dark => write!(f, "Dark"),
            Self::Flat => write!(f, "Flat"),
            Self::Light => write!(f, "Light"),
        }
    }
}

/// One distinct detector readout mode: frame size, subframe origin and
/// binning. Frames belong to the same calibration group iff all six
/// fields are equal.
///
/// `Ord` is derived so that groups sort ascending lexicographic on the
/// field tuple, keeping downstream filenames stable across runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DetectorConfig {
    pub x_size: u32,
    pub y_size: u32,
    pub x_origin: u32,
    pub y_origin: u32,
    pub x_bin: u32,
    pub y_bin: u32,
}

impl DetectorConfig {
    /// Human-readable configuration string used in archive filenames,
    /// e.g. `x0-2048_2bin_y0-2048_2bin`.
    pub fn config_str(&self) -> String {
        format!(
            "x{}-{}_{}bin_y{}-{}_{}bin",
            self.x_origin, self.x_size, self.x_bin, self.y_origin, self.y_size, self.y_bin
        )
    }
}

/// A single raw exposure as read from disk. Never mutated; calibration
/// steps produce new pixel buffers.
#[derive(Clone, Debug)]
pub struct FrameRecord {
    pub frame_type: FrameType,
    pub telescope: Telescope,
    pub instrument: String,
    /// Exposure time in seconds.
    pub exposure: f64,
    /// Filter name; present for flats and lights.
    pub filter: Option<String>,
    /// Target name; lights only.
    pub object: Option<String>,
    /// Julian date of the exposure.
    pub julian_date: f64,
    /// Camera readout mode string, when the header carries one.
    pub readout_mode: Option<String>,
    pub detector: DetectorConfig,
    /// Pixel data, row-major, shape = (height, width).
    pub data: Array2<f32>,
    /// File this record was read from.
    pub path: PathBuf,
}

/// A synthesized calibration frame.
///
/// `data` may be empty: an empty master is a valid state meaning "no raw
/// frames were available", and is never written to disk as a distinct file.
#[derive(Clone, Debug)]
pub struct MasterFrame {
    pub frame_type: FrameType,
    /// Pixel data; empty (0x0) for the no-input sentinel.
    pub data: Array2<f32>,
    /// Per-pixel sample standard deviation, kept only when uncertainty
    /// preservation is enabled.
    pub uncertainty: Option<Array2<f32>>,
    /// Effective exposure time in seconds (1 for darks and flats after
    /// normalization).
    pub exposure: f64,
    /// Files the master was combined from, or the archived file it was
    /// loaded from.
    pub provenance: Vec<String>,
}

impl MasterFrame {
    /// The no-raw-frames sentinel.
    pub fn empty(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            data: Array2::zeros((0, 0)),
            uncertainty: None,
            exposure: 0.0,
            provenance: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A calibrated light frame ready for persistence.
#[derive(Clone, Debug)]
pub struct ReducedFrame {
    pub object: String,
    /// Julian date, after any instrument timestamp correction.
    pub julian_date: f64,
    pub filter: String,
    pub telescope: Telescope,
    pub instrument: String,
    pub exposure: f64,
    pub data: Array2<f32>,
    /// Filenames of the masters applied at each calibration step.
    pub debias: String,
    pub dedark: String,
    pub deflat: String,
    /// Comment describing the applied timestamp correction, when one was.
    pub time_correction: Option<String>,
}

impl ReducedFrame {
    pub fn output_stem(&self) -> String {
        output_stem(&self.object, self.julian_date, &self.filter, self.telescope)
    }
}

/// Output filename stem: `{object}_{jd}_{filter}_{telescope}`, with the
/// decimal point of the Julian date replaced by an underscore.
pub fn output_stem(object: &str, julian_date: f64, filter: &str, telescope: Telescope) -> String {
    let jd = julian_date.to_string().replace('.', "_");
    format!("{object}_{jd}_{filter}_{telescope}")
}
