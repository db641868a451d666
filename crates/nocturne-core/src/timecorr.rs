//! Instrument timestamp corrections.
//!
//! Some readout modes delay the shutter relative to the recorded timestamp;
//! the C28 camera's RBI flood pre-flush is one. Corrections are keyed by
//! (telescope, readout mode) and telescopes/modes without an entry are a
//! no-op.

use crate::keywords::Telescope;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Clone, Copy, Debug)]
pub struct TimestampCorrection {
    pub readout_mode: &'static str,
    pub offset_seconds: f64,
    pub comment: &'static str,
}

impl TimestampCorrection {
    pub fn offset_days(&self) -> f64 {
        self.offset_seconds / SECONDS_PER_DAY
    }
}

static C28_RBI_FLOOD: TimestampCorrection = TimestampCorrection {
    readout_mode: "8 MHz (RBI Flood)",
    offset_seconds: 4.0,
    comment: "JD shifted by RBI flood pre-flush delay",
};

/// The correction applying to a frame's readout mode, if any.
pub fn correction_for(
    telescope: Telescope,
    readout_mode: Option<&str>,
) -> Option<&'static TimestampCorrection> {
    let mode = readout_mode?.trim();
    match telescope {
        Telescope::C28 if mode == C28_RBI_FLOOD.readout_mode => Some(&C28_RBI_FLOOD),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rbi_flood_matches_c28_only() {
        let mode = Some("8 MHz (RBI Flood)");
        assert!(correction_for(Telescope::C28, mode).is_some());
        assert!(correction_for(Telescope::C18, mode).is_none());
        assert!(correction_for(Telescope::OneMeter, mode).is_none());
    }

    #[test]
    fn other_modes_are_a_noop() {
        assert!(correction_for(Telescope::C28, Some("1 MHz")).is_none());
        assert!(correction_for(Telescope::C28, None).is_none());
    }

    #[test]
    fn offset_converts_to_days() {
        let corr = correction_for(Telescope::C28, Some("8 MHz (RBI Flood)")).unwrap();
        assert_abs_diff_eq!(corr.offset_days() * SECONDS_PER_DAY, 4.0, epsilon = 1e-12);
    }
}
