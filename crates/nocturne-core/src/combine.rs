//! Pixel-level combination and calibration arithmetic.
//!
//! The combiner applies optional per-frame scale factors before taking the
//! per-pixel median, matching how dark frames are normalized by exposure
//! time and flats by mean illumination prior to combination.

use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{NocturneError, Result};

/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Combine frames by computing the median at each pixel position.
///
/// `scaling`, when given, holds one multiplicative factor per frame applied
/// before combination. Uses `select_nth_unstable` for O(n) median without a
/// full sort; parallelizes at the row level for large images.
pub fn median_combine(frames: &[Array2<f32>], scaling: Option<&[f32]>) -> Result<Array2<f32>> {
    let scale = check_inputs(frames, scaling)?;
    let (h, w) = frames[0].dim();
    let n = frames.len();

    if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        // Row-parallel: each row allocates its own pixel_values
        let rows: Vec<Vec<f32>> = (0..h)
            .into_par_iter()
            .map(|row| {
                let mut pixel_values = vec![0.0f32; n];
                let mut row_result = vec![0.0f32; w];
                for (col, result) in row_result.iter_mut().enumerate() {
                    for (i, frame) in frames.iter().enumerate() {
                        pixel_values[i] = frame[[row, col]] * scale(i);
                    }
                    *result = compute_median(&mut pixel_values, n);
                }
                row_result
            })
            .collect();

        let mut result = Array2::<f32>::zeros((h, w));
        for (row, row_data) in rows.into_iter().enumerate() {
            for (col, val) in row_data.into_iter().enumerate() {
                result[[row, col]] = val;
            }
        }
        Ok(result)
    } else {
        // Sequential for small images
        let mut result = Array2::<f32>::zeros((h, w));
        let mut pixel_values = vec![0.0f32; n];

        for row in 0..h {
            for col in 0..w {
                for (i, frame) in frames.iter().enumerate() {
                    pixel_values[i] = frame[[row, col]] * scale(i);
                }
                result[[row, col]] = compute_median(&mut pixel_values, n);
            }
        }
        Ok(result)
    }
}

/// Per-pixel sample standard deviation of the (scaled) input stack.
///
/// Used as the uncertainty plane when uncertainty preservation is enabled.
pub fn std_combine(frames: &[Array2<f32>], scaling: Option<&[f32]>) -> Result<Array2<f32>> {
    let scale = check_inputs(frames, scaling)?;
    let (h, w) = frames[0].dim();
    let n = frames.len();

    let mut result = Array2::<f32>::zeros((h, w));
    if n < 2 {
        return Ok(result);
    }

    for row in 0..h {
        for col in 0..w {
            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            for (i, frame) in frames.iter().enumerate() {
                let v = (frame[[row, col]] * scale(i)) as f64;
                sum += v;
                sum_sq += v * v;
            }
            let mean = sum / n as f64;
            let var = (sum_sq - sum * mean) / (n - 1) as f64;
            result[[row, col]] = var.max(0.0).sqrt() as f32;
        }
    }
    Ok(result)
}

fn check_inputs<'a>(
    frames: &[Array2<f32>],
    scaling: Option<&'a [f32]>,
) -> Result<impl Fn(usize) -> f32 + 'a> {
    if frames.is_empty() {
        return Err(NocturneError::EmptySequence);
    }
    let dim = frames[0].dim();
    for frame in &frames[1..] {
        if frame.dim() != dim {
            return Err(dimension_mismatch(frame, &frames[0]));
        }
    }
    if let Some(s) = scaling {
        debug_assert_eq!(s.len(), frames.len());
    }
    Ok(move |i: usize| scaling.map_or(1.0, |s| s[i]))
}

fn compute_median(pixel_values: &mut [f32], n: usize) -> f32 {
    if n == 1 {
        pixel_values[0]
    } else if n % 2 == 1 {
        let mid = n / 2;
        *pixel_values
            .select_nth_unstable_by(mid, |a, b| a.total_cmp(b))
            .1
    } else {
        let mid = n / 2;
        pixel_values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        pixel_values[..mid].select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b));
        (pixel_values[mid - 1] + pixel_values[mid]) / 2.0
    }
}

/// Bias subtraction: `frame - bias`.
pub fn subtract(frame: &Array2<f32>, bias: &Array2<f32>) -> Result<Array2<f32>> {
    check_dims(frame, bias)?;
    Ok(frame - bias)
}

/// Dark subtraction with exposure scaling: `frame - dark * exposure_ratio`,
/// where `exposure_ratio` is frame exposure over dark exposure.
pub fn subtract_scaled(
    frame: &Array2<f32>,
    dark: &Array2<f32>,
    exposure_ratio: f32,
) -> Result<Array2<f32>> {
    check_dims(frame, dark)?;
    Ok(frame - &(dark * exposure_ratio))
}

/// Flat-field correction: `frame / flat`, with zero flat pixels passed
/// through unchanged rather than producing infinities.
pub fn divide(frame: &Array2<f32>, flat: &Array2<f32>) -> Result<Array2<f32>> {
    check_dims(frame, flat)?;
    let mut out = frame.clone();
    out.zip_mut_with(flat, |v, &f| {
        if f != 0.0 {
            *v /= f;
        }
    });
    Ok(out)
}

fn check_dims(frame: &Array2<f32>, cal: &Array2<f32>) -> Result<()> {
    if frame.dim() != cal.dim() {
        return Err(dimension_mismatch(frame, cal));
    }
    Ok(())
}

fn dimension_mismatch(frame: &Array2<f32>, cal: &Array2<f32>) -> NocturneError {
    NocturneError::DimensionMismatch {
        frame_rows: frame.nrows(),
        frame_cols: frame.ncols(),
        cal_rows: cal.nrows(),
        cal_cols: cal.ncols(),
    }
}
