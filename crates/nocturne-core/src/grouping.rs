//! Partitioning of a night's raw frames by detector readout configuration.

use std::collections::BTreeMap;

use crate::frame::{DetectorConfig, FrameRecord};

/// Partition frames into groups of identical detector configuration.
///
/// Groups come back in ascending lexicographic order on the configuration
/// tuple, with frame indices in input order within each group. Every input
/// index appears in exactly one group.
pub fn group_by_detector(frames: &[FrameRecord]) -> Vec<(DetectorConfig, Vec<usize>)> {
    let mut groups: BTreeMap<DetectorConfig, Vec<usize>> = BTreeMap::new();
    for (i, frame) in frames.iter().enumerate() {
        groups.entry(frame.detector).or_default().push(i);
    }
    groups.into_iter().collect()
}
