//! Candidate classification and the per-observation summary file.

use std::fmt::Write as _;
use std::path::Path;

use crate::known::{KnownMatch, match_known};
use crate::types::{Candidate, KnownPulsar, SearchUnit};

#[derive(Clone, Debug, PartialEq)]
pub enum CandidateClass {
    /// Below the minimum acceptable DM.
    LikelyRfi,
    Known(KnownMatch),
    New,
}

impl CandidateClass {
    pub fn is_new(&self) -> bool {
        matches!(self, CandidateClass::New)
    }

    pub fn label(&self) -> String {
        match self {
            CandidateClass::LikelyRfi => "Likely RFI".to_string(),
            CandidateClass::Known(m) => format!("Likely {} - {}", m.name, m.explanation),
            CandidateClass::New => String::new(),
        }
    }
}

/// A sifted candidate with the unit it came from and its classification.
#[derive(Clone, Debug)]
pub struct ClassifiedCandidate {
    pub unit: SearchUnit,
    pub candidate: Candidate,
    pub class: CandidateClass,
}

pub fn classify(
    c: &Candidate,
    catalog: &[KnownPulsar],
    max_harmonic: u32,
    min_dm: f64,
) -> CandidateClass {
    if c.dm < min_dm {
        return CandidateClass::LikelyRfi;
    }
    match match_known(c.period_s, catalog, max_harmonic) {
        Some(m) => CandidateClass::Known(m),
        None => CandidateClass::New,
    }
}

/// Summary text: candidate counts per unit, then every candidate ordered by period.
pub fn format_summary(
    observation: &str,
    units: &[(SearchUnit, Vec<ClassifiedCandidate>)],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Candidates of {observation}");
    let _ = writeln!(out, "#");
    for (unit, cands) in units {
        let _ = writeln!(
            out,
            "# {:>6} {:>5}: {:>5} candidates",
            unit.segment,
            unit.chunk,
            cands.len()
        );
    }
    let _ = writeln!(out, "#");

    let mut all: Vec<&ClassifiedCandidate> = units.iter().flat_map(|(_, c)| c).collect();
    all.sort_by(|a, b| a.candidate.period_s.total_cmp(&b.candidate.period_s));

    let _ = writeln!(
        out,
        "#{:>15} {:>9} {:>7} {:>6} {:>5}  {:<40} Notes",
        "P(ms)", "DM", "sigma", "seg", "ck", "file:candnum"
    );
    for c in all {
        let _ = writeln!(
            out,
            "{:>16.8} {:>9.2} {:>7.2} {:>6} {:>5}  {:<40} {}",
            c.candidate.period_s * 1000.0,
            c.candidate.dm,
            c.candidate.sigma,
            c.unit.segment,
            c.unit.chunk,
            c.candidate.id(),
            c.class.label()
        );
    }
    out
}

pub fn write_summary(
    path: &Path,
    observation: &str,
    units: &[(SearchUnit, Vec<ClassifiedCandidate>)],
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format_summary(observation, units))
}
