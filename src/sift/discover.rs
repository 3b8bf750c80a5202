//! Finding a unit's result files and loading their candidates in DM order.

use log::{debug, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use super::candidate::{dm_from_name, parse_accel_file};
use crate::engine::tools::list_matching;
use crate::error::ParseError;
use crate::types::Candidate;

/// A discovered result file with the DM parsed from its name.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultFile {
    pub path: PathBuf,
    pub dm: f64,
}

/// Name patterns of acceleration and jerk search results.
pub fn accel_patterns(zmax_list: &[u32], jerk: Option<(u32, u32)>) -> Vec<String> {
    let mut patterns: Vec<String> = zmax_list.iter().map(|z| format!("*_ACCEL_{z}")).collect();
    if let Some((z, w)) = jerk {
        patterns.push(format!("*_ACCEL_{z}_JERK_{w}"));
    }
    patterns
}

/// Result files in `dir` matching any pattern, ordered by numeric DM then name.
/// Files without a parsable DM are skipped.
pub fn discover_results(dir: &Path, patterns: &[String]) -> Vec<ResultFile> {
    let mut files: Vec<ResultFile> = patterns
        .iter()
        .flat_map(|p| list_matching(dir, p))
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            match dm_from_name(&name) {
                Some(dm) => Some(ResultFile { path, dm }),
                None => {
                    warn!("No DM in result file name {name}; skipped");
                    None
                }
            }
        })
        .collect();
    files.sort_by(|a, b| a.dm.total_cmp(&b.dm).then_with(|| a.path.cmp(&b.path)));
    files.dedup_by(|a, b| a.path == b.path);
    files
}

/// Parse every file in parallel and concatenate in file order, numbering candidates by
/// discovery order. Malformed rows are skipped; an unreadable file aborts.
pub fn load_candidates(files: &[ResultFile]) -> Result<Vec<Candidate>, ParseError> {
    let parsed = files
        .par_iter()
        .map(|f| parse_accel_file(&f.path, f.dm))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    let mut malformed = 0;
    for file in parsed {
        for e in &file.malformed {
            debug!("{e}");
        }
        malformed += file.malformed.len();
        out.extend(file.candidates);
    }
    if malformed > 0 {
        warn!("Skipped {malformed} malformed candidate record(s)");
    }
    for (i, c) in out.iter_mut().enumerate() {
        c.ordinal = i;
    }
    Ok(out)
}
