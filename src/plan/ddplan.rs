//! Invocation and report parsing for the external DM planner (`DDplan.py`).

use super::{PlanRequest, check_coherent_dm, round_dm, subdivide};
use crate::error::PlanError;
use crate::types::DedispersionScheme;

/// Shell command that asks the planner for a plan of `req`, output prefix `ddplan_<basename>`.
pub fn ddplan_command(basename: &str, req: &PlanRequest) -> Result<String, PlanError> {
    check_coherent_dm(req.coherent_dm)?;
    let mut cmd = format!(
        "DDplan.py -o ddplan_{basename} -l {} -d {}",
        req.lo_dm, req.high_dm
    );
    if req.coherent_dm > 0.0 {
        cmd.push_str(&format!(" -c {}", req.coherent_dm));
    }
    cmd.push_str(&format!(
        " -f {} -b {} -n {} -t {}",
        req.centre_freq_mhz,
        req.bandwidth_mhz.abs(),
        req.num_channels,
        req.sample_time_s
    ));
    if req.nsubbands > 0 {
        cmd.push_str(&format!(" -s {}", req.nsubbands));
    }
    Ok(cmd)
}

#[derive(Clone, Copy, PartialEq)]
enum TableKind {
    Plain,
    Subband,
}

/// Header row of the scheme table; the subband variant has a `dsubDM` column.
fn table_kind(line: &str) -> Option<TableKind> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 6 || tokens[..6] != ["Low", "DM", "High", "DM", "dDM", "DownSamp"] {
        return None;
    }
    if tokens.contains(&"dsubDM") {
        Some(TableKind::Subband)
    } else {
        Some(TableKind::Plain)
    }
}

fn field<T: std::str::FromStr>(cols: &[&str], i: usize, row: usize) -> Result<T, PlanError> {
    cols.get(i)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| PlanError::MalformedRow {
            row,
            reason: format!("column {} missing or not a number", i + 1),
        })
}

/// Parse the planner's text report into batches of at most `cap` trials.
///
/// Rows are read from the table header down to the first blank line. A subbanded row
/// expands into one batch per call, each `dsubDM` wide.
pub fn parse_ddplan_report(
    text: &str,
    cap: usize,
    nsubbands: u32,
) -> Result<Vec<DedispersionScheme>, PlanError> {
    let mut lines = text.lines().enumerate();
    let kind = lines
        .by_ref()
        .find_map(|(_, l)| table_kind(l))
        .ok_or(PlanError::MissingTable)?;
    if (kind == TableKind::Subband) != (nsubbands > 0) {
        log::warn!(
            "Planner table {} subbands but {} were requested",
            if kind == TableKind::Subband { "uses" } else { "has no" },
            nsubbands
        );
    }

    let mut schemes = Vec::new();
    for (idx, line) in lines {
        if line.trim().is_empty() {
            break;
        }
        let row = idx + 1;
        let cols: Vec<&str> = line.split_whitespace().collect();
        let lo: f64 = field(&cols, 0, row)?;
        let hi: f64 = field(&cols, 1, row)?;
        let d_dm: f64 = field(&cols, 2, row)?;
        let downsamp: u32 = field(&cols, 3, row)?;
        match kind {
            TableKind::Plain => {
                let raw = DedispersionScheme {
                    lo_dm: lo,
                    high_dm: hi,
                    d_dm,
                    downsamp,
                    num_dms: field(&cols, 4, row)?,
                };
                schemes.extend(subdivide(&raw, cap)?);
            }
            TableKind::Subband => {
                let dsub_dm: f64 = field(&cols, 4, row)?;
                let per_call: usize = field(&cols, 6, row)?;
                let calls: usize = field(&cols, 7, row)?;
                for k in 0..calls {
                    let call = DedispersionScheme {
                        lo_dm: round_dm(lo + k as f64 * dsub_dm),
                        high_dm: round_dm(lo + (k + 1) as f64 * dsub_dm),
                        d_dm,
                        downsamp,
                        num_dms: per_call,
                    };
                    schemes.extend(subdivide(&call, cap)?);
                }
            }
        }
    }
    Ok(schemes)
}
