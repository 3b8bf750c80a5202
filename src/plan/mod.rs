//! Dedispersion planning: split raw DM schemes into batches no larger than the per-call cap.
//!
//! The fine-grained plan (step sizes, downsampling boundaries) comes from the external
//! planner's report ([`ddplan`]) or from a fixed list of `[lo, hi, step]` ranges.

pub mod ddplan;

pub use ddplan::{ddplan_command, parse_ddplan_report};

use crate::error::PlanError;
use crate::types::DedispersionScheme;

/// Everything the planner needs. Built from the `[dedispersion]` section and the observation.
#[derive(Clone, Debug)]
pub struct PlanRequest {
    pub lo_dm: f64,
    pub high_dm: f64,
    /// 0 disables coherent dedispersion.
    pub coherent_dm: f64,
    pub max_dms_per_call: usize,
    /// 0 means no subbanding.
    pub nsubbands: u32,
    pub centre_freq_mhz: f64,
    pub bandwidth_mhz: f64,
    pub num_channels: u32,
    pub sample_time_s: f64,
}

/// Rounds DM boundaries to the planner's precision so adjacent batches share exact edges.
pub(crate) fn round_dm(dm: f64) -> f64 {
    (dm * 1000.0).round() / 1000.0
}

pub fn check_coherent_dm(dm: f64) -> Result<(), PlanError> {
    if dm < 0.0 {
        return Err(PlanError::NegativeCoherentDm(dm));
    }
    Ok(())
}

/// Split `raw` when it holds more than `cap` trials.
///
/// Every batch but the last holds exactly `cap` trials. The last runs to `raw.high_dm` and
/// holds the remainder plus one trial, so the top of the range is searched. The batch count
/// is chosen so the widened last batch still fits under `cap`. When `num_dms` is an exact
/// multiple of `cap`, that last batch is the single closing trial at `raw.high_dm`.
pub fn subdivide(
    raw: &DedispersionScheme,
    cap: usize,
) -> Result<Vec<DedispersionScheme>, PlanError> {
    if cap == 0 {
        return Err(PlanError::ZeroCap);
    }
    if raw.num_dms <= cap {
        return Ok(vec![raw.clone()]);
    }

    let total = raw.num_dms + 1;
    let batches = total.div_ceil(cap);
    let edge = |i: usize| round_dm(raw.lo_dm + (i * cap) as f64 * raw.d_dm);

    let mut out: Vec<DedispersionScheme> = (0..batches - 1)
        .map(|i| DedispersionScheme {
            lo_dm: edge(i),
            high_dm: edge(i + 1),
            d_dm: raw.d_dm,
            downsamp: raw.downsamp,
            num_dms: cap,
        })
        .collect();
    out.push(DedispersionScheme {
        lo_dm: edge(batches - 1),
        high_dm: raw.high_dm,
        d_dm: raw.d_dm,
        downsamp: raw.downsamp,
        num_dms: total - (batches - 1) * cap,
    });
    Ok(out)
}

/// Number of whole steps in `[lo, hi)`, tolerant of float noise on exact multiples.
fn whole_steps(lo: f64, hi: f64, step: f64) -> usize {
    let n = (hi - lo) / step;
    if (n - n.round()).abs() < 1e-6 {
        n.round() as usize
    } else {
        n.floor() as usize
    }
}

/// Plan from explicit `[lo, hi, step]` ranges (planner disabled). Downsampling is 1.
pub fn plan_from_steps(
    steps: &[[f64; 3]],
    cap: usize,
) -> Result<Vec<DedispersionScheme>, PlanError> {
    let mut out = Vec::new();
    for &[lo, hi, step] in steps {
        if step.is_nan() || step <= 0.0 || hi <= lo || lo < 0.0 {
            return Err(PlanError::InvalidStep { lo, hi, step });
        }
        let raw = DedispersionScheme {
            lo_dm: lo,
            high_dm: hi,
            d_dm: step,
            downsamp: 1,
            num_dms: whole_steps(lo, hi, step),
        };
        out.extend(subdivide(&raw, cap)?);
    }
    Ok(out)
}

/// Total DM trials across all schemes.
pub fn total_trials(schemes: &[DedispersionScheme]) -> usize {
    schemes.iter().map(|s| s.num_dms).sum()
}
