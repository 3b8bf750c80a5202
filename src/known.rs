//! Known-pulsar catalog and harmonic-tolerant matching.
//!
//! The catalog is a directory of timing-model `.par` files. Each entry's Doppler tolerance is
//! fixed at load time: for binaries the peak line-of-sight orbital velocity over `c`, for
//! isolated pulsars a small constant covering Earth's orbit.

use log::{debug, warn};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::Path;

use crate::engine::tools::list_matching;
use crate::error::ParseError;
use crate::types::KnownPulsar;
use crate::utils::config::KnownPulsarConsts;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Parse `KEY VALUE ...` lines of a par file. Fortran `D` exponents are accepted.
fn par_values(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|l| {
            let mut it = l.split_whitespace();
            let key = it.next()?;
            let value = it.next().unwrap_or("");
            Some((key.to_ascii_uppercase(), value.to_string()))
        })
        .collect()
}

fn par_f64(values: &HashMap<String, String>, key: &str) -> Option<f64> {
    values
        .get(key)
        .and_then(|v| v.replace(['D', 'd'], "e").parse().ok())
}

/// Doppler fraction of a binary: 2π·a·sin(i)/P_b, with `a1` in light-seconds, `pb_s` in s.
pub fn binary_doppler_fraction(a1_lt_s: f64, pb_s: f64) -> f64 {
    let v_max = 2.0 * PI * a1_lt_s * KnownPulsarConsts::C / pb_s;
    v_max / KnownPulsarConsts::C
}

/// Build one catalog entry from par-file text. `file` names the source in errors.
pub fn parse_parfile(file: &str, text: &str) -> Result<KnownPulsar, ParseError> {
    let values = par_values(text);
    let missing = |key: &str| ParseError::MissingKey {
        file: file.to_string(),
        key: key.to_string(),
    };
    let name = values
        .get("PSRJ")
        .or_else(|| values.get("PSR"))
        .or_else(|| values.get("PSRB"))
        .cloned()
        .ok_or_else(|| missing("PSR"))?;
    let period_s = match (par_f64(&values, "F0"), par_f64(&values, "P0")) {
        (Some(f0), _) if f0 > 0.0 => 1.0 / f0,
        (_, Some(p0)) if p0 > 0.0 => p0,
        _ => return Err(missing("F0")),
    };

    let doppler_fraction = if values.contains_key("BINARY") {
        let pb_s = match (par_f64(&values, "PB"), par_f64(&values, "FB0")) {
            (Some(pb), _) if pb > 0.0 => pb * SECONDS_PER_DAY,
            (_, Some(fb0)) if fb0 > 0.0 => 1.0 / fb0,
            _ => return Err(missing("PB")),
        };
        let a1 = par_f64(&values, "A1").ok_or_else(|| missing("A1"))?;
        binary_doppler_fraction(a1, pb_s)
    } else {
        KnownPulsarConsts::ISOLATED_DOPPLER
    };

    Ok(KnownPulsar {
        name,
        period_s,
        doppler_fraction,
    })
}

/// Load every `*.par` in `dir`, in file-name order. Unreadable or incomplete files are
/// skipped with a warning; a missing directory gives an empty catalog.
pub fn load_catalog(dir: &Path) -> Vec<KnownPulsar> {
    if !dir.is_dir() {
        debug!("No known-pulsar directory at {}", dir.display());
        return Vec::new();
    }
    let mut catalog = Vec::new();
    for path in list_matching(dir, "*.par") {
        let name = path.display().to_string();
        let parsed = std::fs::read_to_string(&path)
            .map_err(|source| ParseError::Unreadable {
                path: path.clone(),
                source,
            })
            .and_then(|text| parse_parfile(&name, &text));
        match parsed {
            Ok(p) => catalog.push(p),
            Err(e) => warn!("Known pulsar skipped: {e}"),
        }
    }
    debug!("Loaded {} known pulsar(s)", catalog.len());
    catalog
}

/// A candidate identified as a known pulsar.
#[derive(Clone, Debug, PartialEq)]
pub struct KnownMatch {
    pub name: String,
    /// Candidate period ≈ known period × numerator / harmonic. 1/1 for the fundamental.
    pub numerator: u32,
    pub harmonic: u32,
    pub explanation: String,
}

impl KnownMatch {
    pub fn is_fundamental(&self) -> bool {
        self.numerator == 1 && self.harmonic == 1
    }
}

/// Match a candidate period against the catalog.
///
/// All catalog entries are first tested for a direct hit, strictly inside P(1±d). Then each
/// entry in catalog order is swept over harmonic `nh` in `1..=max_harmonic` and numerator
/// `n` in `1..=16`, with the window scaled by n/nh (bounds inclusive). The first hit wins;
/// it is not necessarily the closest.
pub fn match_known(
    period_s: f64,
    catalog: &[KnownPulsar],
    max_harmonic: u32,
) -> Option<KnownMatch> {
    for psr in catalog {
        let lo = psr.period_s * (1.0 - psr.doppler_fraction);
        let hi = psr.period_s * (1.0 + psr.doppler_fraction);
        if period_s > lo && period_s < hi {
            return Some(KnownMatch {
                name: psr.name.clone(),
                numerator: 1,
                harmonic: 1,
                explanation: format!("fundamental ({:.7} ms)", psr.period_s * 1000.0),
            });
        }
    }

    for psr in catalog {
        let lo = psr.period_s * (1.0 - psr.doppler_fraction);
        let hi = psr.period_s * (1.0 + psr.doppler_fraction);
        for nh in 1..=max_harmonic.max(1) {
            for n in 1..=KnownPulsarConsts::MAX_NUMERATOR {
                let scale = f64::from(n) / f64::from(nh);
                if period_s >= lo * scale && period_s <= hi * scale {
                    return Some(KnownMatch {
                        name: psr.name.clone(),
                        numerator: n,
                        harmonic: nh,
                        explanation: format!(
                            "{n}/{nh} harmonic of {:.7} ms",
                            psr.period_s * 1000.0
                        ),
                    });
                }
            }
        }
    }
    None
}
