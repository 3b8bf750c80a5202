//! Expand an observation into segments and chunks. Pure: the result depends only on the
//! duration and the segment list.

use log::warn;

use crate::types::{Chunk, SearchUnit, Segment};
use crate::utils::config::ChunkThresholds;

pub const FULL_LABEL: &str = "full";

/// What happens to the piece left after the last whole chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Remainder {
    /// Nothing left over.
    None,
    /// Near-full trailing piece kept as an extra (short) chunk.
    Kept(f64),
    /// Dropped with a warning.
    DroppedWarn(f64),
    /// Negligible; dropped silently.
    DroppedQuiet(f64),
}

/// Classify a leftover fraction of one chunk length.
pub fn classify_remainder(fraction: f64) -> Remainder {
    if fraction <= 0.0 {
        Remainder::None
    } else if fraction >= ChunkThresholds::KEEP_FRACTION {
        Remainder::Kept(fraction)
    } else if fraction > ChunkThresholds::WARN_FRACTION {
        Remainder::DroppedWarn(fraction)
    } else {
        Remainder::DroppedQuiet(fraction)
    }
}

/// Label of a segment of `minutes` length: `20m`, or `7.5m` for fractional lengths.
pub fn segment_label(minutes: f64) -> String {
    if minutes.fract() == 0.0 {
        format!("{minutes:.0}m")
    } else {
        format!("{minutes}m")
    }
}

pub fn chunk_label(index: usize) -> String {
    format!("ck{index:02}")
}

/// Chunks of a segment of `length_s` seconds over `duration_s`, or `None` when the segment is
/// redundant with the full-length search.
pub fn split_segment(duration_s: f64, length_s: f64) -> Option<Vec<Chunk>> {
    if length_s >= ChunkThresholds::REDUNDANT_SEGMENT_FRACTION * duration_s {
        return None;
    }
    let ratio = duration_s / length_s;
    let whole = ratio.floor() as usize;
    let count = match classify_remainder(ratio - ratio.floor()) {
        Remainder::Kept(_) => whole + 1,
        _ => whole,
    };
    let chunks = (0..count)
        .map(|i| {
            let start_s = i as f64 * length_s;
            Chunk {
                label: chunk_label(i),
                start_s,
                length_s: length_s.min(duration_s - start_s),
            }
        })
        .collect();
    Some(chunks)
}

/// Build the full search structure. Redundant segments and dropped trailing pieces are logged.
pub fn build_structure(duration_s: f64, search_full: bool, segment_minutes: &[f64]) -> Vec<Segment> {
    let mut segments = Vec::new();
    if search_full {
        segments.push(Segment {
            label: FULL_LABEL.to_string(),
            length_s: None,
            chunks: vec![Chunk {
                label: chunk_label(0),
                start_s: 0.0,
                length_s: duration_s,
            }],
        });
    }

    for &minutes in segment_minutes {
        let label = segment_label(minutes);
        if segments.iter().any(|s: &Segment| s.label == label) {
            warn!("Segment {label} listed twice; ignoring the repeat");
            continue;
        }
        let length_s = minutes * 60.0;
        let Some(chunks) = split_segment(duration_s, length_s) else {
            warn!(
                "Segment {label} ({length_s:.0} s) is at least {:.0}% of the observation ({duration_s:.1} s); dropped as redundant with '{FULL_LABEL}'",
                ChunkThresholds::REDUNDANT_SEGMENT_FRACTION * 100.0
            );
            continue;
        };
        let ratio = duration_s / length_s;
        if let Remainder::DroppedWarn(frac) = classify_remainder(ratio - ratio.floor()) {
            warn!(
                "Segment {label}: trailing piece is {:.0}% of a chunk; dropped",
                frac * 100.0
            );
        }
        segments.push(Segment {
            label,
            length_s: Some(length_s),
            chunks,
        });
    }
    segments
}

/// Flatten segments into the search units they define, in order.
pub fn search_units(segments: &[Segment]) -> Vec<SearchUnit> {
    segments
        .iter()
        .flat_map(|s| {
            s.chunks
                .iter()
                .map(move |c| SearchUnit::new(s.label.clone(), c.label.clone()))
        })
        .collect()
}
