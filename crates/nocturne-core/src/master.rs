//! Master calibration frame synthesis.
//!
//! All three builders share the same skeleton: cap the input list to the
//! first N frames encountered, apply per-type corrections and scaling, then
//! median-combine. An empty input list is a warning, never an error: bias
//! and dark builders return the empty-master sentinel, the flat builder
//! returns `None` so no file is written for that filter.

use ndarray::Array2;
use tracing::{debug, warn};

use crate::combine::{median_combine, std_combine, subtract, subtract_scaled};
use crate::error::Result;
use crate::frame::{FrameRecord, FrameType, MasterFrame};
use crate::io::store::file_name;

#[derive(Clone, Copy, Debug, Default)]
pub struct SynthesisOptions {
    /// Cap on the number of input frames: the first N encountered are
    /// kept, the rest dropped before combination.
    pub max_num_frames: Option<usize>,
    /// Keep a per-pixel standard deviation plane on the master.
    pub preserve_uncertainty: bool,
}

fn capped<'a>(frames: &'a [&'a FrameRecord], opts: &SynthesisOptions) -> &'a [&'a FrameRecord] {
    match opts.max_num_frames {
        Some(max) if frames.len() > max => &frames[..max],
        _ => frames,
    }
}

fn provenance(frames: &[&FrameRecord]) -> Vec<String> {
    frames.iter().map(|f| file_name(&f.path)).collect()
}

/// Combine raw bias frames by per-pixel median, no prior correction.
pub fn build_master_bias(frames: &[&FrameRecord], opts: &SynthesisOptions) -> Result<MasterFrame> {
    let frames = capped(frames, opts);
    debug!(count = frames.len(), "bias stack");
    if frames.is_empty() {
        warn!("no raw bias frames found");
        return Ok(MasterFrame::empty(FrameType::Bias));
    }

    let stack: Vec<Array2<f32>> = frames.iter().map(|f| f.data.clone()).collect();
    let data = median_combine(&stack, None)?;
    let uncertainty = if opts.preserve_uncertainty {
        Some(std_combine(&stack, None)?)
    } else {
        None
    };

    Ok(MasterFrame {
        frame_type: FrameType::Bias,
        data,
        uncertainty,
        exposure: 0.0,
        provenance: provenance(frames),
    })
}

/// Combine raw dark frames: optional bias subtraction, then per-frame
/// scaling by 1/exposure before the median, normalizing the master to an
/// effective exposure of 1 second.
pub fn build_master_dark(
    frames: &[&FrameRecord],
    bias: &MasterFrame,
    opts: &SynthesisOptions,
) -> Result<MasterFrame> {
    let frames = capped(frames, opts);
    debug!(count = frames.len(), "dark stack");
    if frames.is_empty() {
        warn!("no raw dark frames found");
        return Ok(MasterFrame::empty(FrameType::Dark));
    }

    let mut stack = Vec::with_capacity(frames.len());
    let mut scaling = Vec::with_capacity(frames.len());
    for frame in frames {
        let corrected = if bias.is_empty() {
            frame.data.clone()
        } else {
            subtract(&frame.data, &bias.data)?
        };
        stack.push(corrected);
        scaling.push(exposure_scale(frame));
    }

    let data = median_combine(&stack, Some(&scaling))?;
    let uncertainty = if opts.preserve_uncertainty {
        Some(std_combine(&stack, Some(&scaling))?)
    } else {
        None
    };

    Ok(MasterFrame {
        frame_type: FrameType::Dark,
        data,
        uncertainty,
        exposure: 1.0,
        provenance: provenance(frames),
    })
}

/// Combine raw flat frames of one filter: optional bias subtraction,
/// optional exposure-scaled dark subtraction, then per-frame scaling by
/// 1/mean before the median, normalizing mean illumination to 1.
///
/// Returns `None` when no raw flats were given; no sentinel file is ever
/// written for a filter without flats.
pub fn build_master_flat(
    frames: &[&FrameRecord],
    bias: &MasterFrame,
    dark: &MasterFrame,
    opts: &SynthesisOptions,
) -> Result<Option<MasterFrame>> {
    let frames = capped(frames, opts);
    debug!(count = frames.len(), "flat stack");
    if frames.is_empty() {
        warn!("no raw flat frames found");
        return Ok(None);
    }

    let mut stack = Vec::with_capacity(frames.len());
    let mut scaling = Vec::with_capacity(frames.len());
    for frame in frames {
        let mut corrected = if bias.is_empty() {
            frame.data.clone()
        } else {
            subtract(&frame.data, &bias.data)?
        };
        if !dark.is_empty() {
            let ratio = (frame.exposure / dark.exposure) as f32;
            corrected = subtract_scaled(&corrected, &dark.data, ratio)?;
        }
        let mean = corrected.mean().unwrap_or(0.0);
        if mean == 0.0 {
            warn!(path = %frame.path.display(), "flat frame with zero mean, using unit scale");
            scaling.push(1.0);
        } else {
            scaling.push(1.0 / mean);
        }
        stack.push(corrected);
    }

    let data = median_combine(&stack, Some(&scaling))?;
    let uncertainty = if opts.preserve_uncertainty {
        Some(std_combine(&stack, Some(&scaling))?)
    } else {
        None
    };

    Ok(Some(MasterFrame {
        frame_type: FrameType::Flat,
        data,
        uncertainty,
        exposure: 1.0,
        provenance: provenance(frames),
    }))
}

fn exposure_scale(frame: &FrameRecord) -> f32 {
    if frame.exposure > 0.0 {
        (1.0 / frame.exposure) as f32
    } else {
        warn!(path = %frame.path.display(), "dark frame with non-positive exposure, using unit scale");
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DetectorConfig;
    use crate::keywords::Telescope;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn raw(frame_type: FrameType, value: f32, exposure: f64) -> FrameRecord {
        FrameRecord {
            frame_type,
            telescope: Telescope::C28,
            instrument: "FLI-PL16801".into(),
            exposure,
            filter: Some("V".into()),
            object: None,
            julian_date: 2_459_000.5,
            readout_mode: None,
            detector: DetectorConfig {
                x_size: 2,
                y_size: 2,
                x_origin: 0,
                y_origin: 0,
                x_bin: 1,
                y_bin: 1,
            },
            data: Array2::from_elem((2, 2), value),
            path: format!("{frame_type}_{value}.fits").into(),
        }
    }

    #[test]
    fn bias_is_per_pixel_median() {
        let frames: Vec<FrameRecord> = [10.0, 30.0, 20.0]
            .iter()
            .map(|&v| raw(FrameType::Bias, v, 0.0))
            .collect();
        let refs: Vec<&FrameRecord> = frames.iter().collect();
        let master = build_master_bias(&refs, &SynthesisOptions::default()).unwrap();
        assert_abs_diff_eq!(master.data[[0, 0]], 20.0, epsilon = 1e-6);
        assert_eq!(master.provenance.len(), 3);
    }

    #[test]
    fn empty_bias_input_yields_sentinel() {
        let master = build_master_bias(&[], &SynthesisOptions::default()).unwrap();
        assert!(master.is_empty());
    }

    #[test]
    fn frame_cap_keeps_first_n() {
        let frames: Vec<FrameRecord> = [1.0, 1.0, 100.0, 100.0, 100.0]
            .iter()
            .map(|&v| raw(FrameType::Bias, v, 0.0))
            .collect();
        let refs: Vec<&FrameRecord> = frames.iter().collect();
        let opts = SynthesisOptions {
            max_num_frames: Some(2),
            ..Default::default()
        };
        let master = build_master_bias(&refs, &opts).unwrap();
        // Only the first two frames (value 1.0) survive the cap.
        assert_abs_diff_eq!(master.data[[0, 0]], 1.0, epsilon = 1e-6);
        assert_eq!(master.provenance.len(), 2);
    }

    #[test]
    fn dark_scaled_to_one_second() {
        // 10s dark at 50 counts and 20s dark at 100 counts are both
        // 5 counts/sec; the master must read 5 with exposure 1.
        let frames = vec![raw(FrameType::Dark, 50.0, 10.0), raw(FrameType::Dark, 100.0, 20.0)];
        let refs: Vec<&FrameRecord> = frames.iter().collect();
        let bias = MasterFrame::empty(FrameType::Bias);
        let master = build_master_dark(&refs, &bias, &SynthesisOptions::default()).unwrap();
        assert_abs_diff_eq!(master.data[[1, 1]], 5.0, epsilon = 1e-5);
        assert_abs_diff_eq!(master.exposure, 1.0);
    }

    #[test]
    fn dark_subtracts_bias_when_present() {
        let frames = vec![raw(FrameType::Dark, 110.0, 10.0)];
        let refs: Vec<&FrameRecord> = frames.iter().collect();
        let bias = MasterFrame {
            frame_type: FrameType::Bias,
            data: Array2::from_elem((2, 2), 100.0),
            uncertainty: None,
            exposure: 0.0,
            provenance: vec![],
        };
        let master = build_master_dark(&refs, &bias, &SynthesisOptions::default()).unwrap();
        assert_abs_diff_eq!(master.data[[0, 0]], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn flat_mean_normalized_to_one() {
        let frames = vec![raw(FrameType::Flat, 4000.0, 3.0), raw(FrameType::Flat, 8000.0, 3.0)];
        let refs: Vec<&FrameRecord> = frames.iter().collect();
        let bias = MasterFrame::empty(FrameType::Bias);
        let dark = MasterFrame::empty(FrameType::Dark);
        let master = build_master_flat(&refs, &bias, &dark, &SynthesisOptions::default())
            .unwrap()
            .unwrap();
        let mean = master.data.mean().unwrap();
        assert_abs_diff_eq!(mean, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(master.exposure, 1.0);
    }

    #[test]
    fn flat_without_input_yields_none() {
        let bias = MasterFrame::empty(FrameType::Bias);
        let dark = MasterFrame::empty(FrameType::Dark);
        let result = build_master_flat(&[], &bias, &dark, &SynthesisOptions::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn uncertainty_plane_kept_on_request() {
        let frames: Vec<FrameRecord> = [10.0, 20.0, 30.0]
            .iter()
            .map(|&v| raw(FrameType::Bias, v, 0.0))
            .collect();
        let refs: Vec<&FrameRecord> = frames.iter().collect();
        let opts = SynthesisOptions {
            preserve_uncertainty: true,
            ..Default::default()
        };
        let master = build_master_bias(&refs, &opts).unwrap();
        let unc = master.uncertainty.expect("uncertainty plane");
        assert_abs_diff_eq!(unc[[0, 0]], 10.0, epsilon = 1e-4);
    }
}
