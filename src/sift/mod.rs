//! Candidate Sifter: period cut, duplicate merge, DM-profile filter, harmonic removal, sort.
//!
//! Each stage is a pure function of its input and the policy; the pipeline output is
//! idempotent (sifting an already-sifted list returns it unchanged).

pub mod candidate;
pub mod candlist;
pub mod discover;

pub use candidate::{ParsedFile, dm_from_name, parse_accel_file, parse_accel_text};
pub use candlist::{read_candlist, write_candlist};
pub use discover::{ResultFile, accel_patterns, discover_results, load_candidates};

use log::{debug, warn};
use std::cmp::Ordering;

use crate::types::Candidate;
use crate::utils::config::SiftTolerances;

/// Sifting policy, from `[sifting]`, `[search]` and the unit's duration.
#[derive(Clone, Debug)]
pub struct SiftPolicy {
    pub period_min_s: f64,
    pub period_max_s: f64,
    pub remove_duplicates: bool,
    pub remove_dm_problems: bool,
    pub remove_harmonics: bool,
    /// Fewer distinct DM detections than this, at low DM, marks RFI.
    pub min_num_dms: usize,
    /// Peak DM below this, with few DM detections, marks RFI.
    pub min_dm: f64,
    /// Highest harmonic order checked for harmonic relations.
    pub max_harmonic: u32,
    /// Duration of the searched time series; one Fourier bin is `1 / t_obs_s`.
    pub t_obs_s: f64,
}

/// Strongest first; equal sigma keeps discovery order.
fn by_sigma(a: &Candidate, b: &Candidate) -> Ordering {
    b.sigma
        .total_cmp(&a.sigma)
        .then_with(|| a.ordinal.cmp(&b.ordinal))
}

/// Frequency difference in Fourier bins.
fn bins_apart(f1: f64, f2: f64, t_obs_s: f64) -> f64 {
    (f1 - f2).abs() * t_obs_s
}

/// Stage 1: keep `period_min_s <= P <= period_max_s`.
pub fn filter_period(cands: Vec<Candidate>, policy: &SiftPolicy) -> Vec<Candidate> {
    cands
        .into_iter()
        .filter(|c| c.period_s >= policy.period_min_s && c.period_s <= policy.period_max_s)
        .collect()
}

/// Stage 2: candidates within the bin tolerance of a stronger kept one are re-detections of
/// it. The stronger one is kept and gains their DM hits.
pub fn remove_duplicates(mut cands: Vec<Candidate>, policy: &SiftPolicy) -> Vec<Candidate> {
    cands.sort_by(by_sigma);
    let mut kept: Vec<Candidate> = Vec::with_capacity(cands.len());
    for c in cands {
        let twin = kept.iter_mut().find(|k| {
            bins_apart(k.freq_hz, c.freq_hz, policy.t_obs_s) < SiftTolerances::DUPLICATE_BINS
        });
        match twin {
            Some(k) => k.hits.extend(c.hits),
            None => kept.push(c),
        }
    }
    kept
}

/// Stage 3: few DM detections and a low peak DM is the RFI signature.
pub fn remove_dm_problems(cands: Vec<Candidate>, policy: &SiftPolicy) -> Vec<Candidate> {
    cands
        .into_iter()
        .filter(|c| !(c.distinct_dm_count() < policy.min_num_dms && c.peak_dm() < policy.min_dm))
        .collect()
}

fn similar_dm(a: f64, b: f64) -> bool {
    let tol = SiftTolerances::HARMONIC_DM_ABS
        .max(SiftTolerances::HARMONIC_DM_FRAC * a.abs().max(b.abs()));
    (a - b).abs() <= tol
}

/// `weak` sits at `n/m` times the frequency of `strong` for some `n != m` up to `max_harmonic`.
pub fn is_harmonic_of(weak: &Candidate, strong: &Candidate, policy: &SiftPolicy) -> bool {
    let h = policy.max_harmonic.max(1);
    (1..=h).any(|n| {
        (1..=h).any(|m| {
            n != m
                && bins_apart(
                    weak.freq_hz,
                    strong.freq_hz * f64::from(n) / f64::from(m),
                    policy.t_obs_s,
                ) < SiftTolerances::HARMONIC_BINS
        })
    })
}

fn usable_frequency(c: &Candidate) -> bool {
    c.freq_hz.is_finite() && c.freq_hz > 0.0
}

/// Stage 4: drop candidates harmonically related to a stronger kept one at a similar DM.
/// A record without a usable frequency is skipped on its own.
pub fn remove_harmonics(mut cands: Vec<Candidate>, policy: &SiftPolicy) -> Vec<Candidate> {
    cands.sort_by(by_sigma);
    let mut kept: Vec<Candidate> = Vec::with_capacity(cands.len());
    for c in cands {
        if !usable_frequency(&c) {
            warn!("Skipping malformed candidate {} during harmonic removal", c.id());
            continue;
        }
        let related = kept
            .iter()
            .any(|k| similar_dm(k.dm, c.dm) && is_harmonic_of(&c, k, policy));
        if !related {
            kept.push(c);
        }
    }
    kept
}

/// Run the enabled stages in order and sort by sigma. Never fails; empty in, empty out.
pub fn sift(cands: Vec<Candidate>, policy: &SiftPolicy) -> Vec<Candidate> {
    let n0 = cands.len();
    let mut cands = filter_period(cands, policy);
    debug!("sift: {} of {n0} within the period range", cands.len());
    if policy.remove_duplicates {
        cands = remove_duplicates(cands, policy);
        debug!("sift: {} after duplicate removal", cands.len());
    }
    if policy.remove_dm_problems {
        cands = remove_dm_problems(cands, policy);
        debug!("sift: {} after DM-problem removal", cands.len());
    }
    if policy.remove_harmonics {
        cands = remove_harmonics(cands, policy);
        debug!("sift: {} after harmonic removal", cands.len());
    }
    cands.sort_by(by_sigma);
    cands
}
