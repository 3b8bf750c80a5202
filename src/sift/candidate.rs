//! Parsing of acceleration-search text results (`*_ACCEL_<z>` and `*_ACCEL_<z>_JERK_<w>`).
//!
//! The fundamentals table starts after the `Cand  Sigma ...` header and its dashed rule and
//! ends at the first blank line. Values may carry an uncertainty in parentheses, e.g.
//! `2.91447052(21)` or `-1.3(6.6)e-05`.

use std::path::Path;

use crate::error::ParseError;
use crate::types::{Candidate, DmHit};

/// Candidates of one file, plus the rows that could not be read.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub candidates: Vec<Candidate>,
    pub malformed: Vec<ParseError>,
}

/// DM encoded in a product name: `obs_full_ck00_DM12.30_ACCEL_0` → 12.30.
pub fn dm_from_name(name: &str) -> Option<f64> {
    let stem = name.split("_ACCEL").next()?;
    let pos = stem.rfind("DM")?;
    let digits: String = stem[pos + 2..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    digits.trim_end_matches('.').parse().ok()
}

/// Drop a parenthesised uncertainty: `-1.3(6.6)e-05` → `-1.3e-05`.
pub fn strip_uncertainty(token: &str) -> String {
    match (token.find('('), token.find(')')) {
        (Some(open), Some(close)) if close > open => {
            format!("{}{}", &token[..open], &token[close + 1..])
        }
        _ => token.to_string(),
    }
}

fn num(cols: &[&str], i: usize, name: &str) -> Result<f64, String> {
    let raw = cols.get(i).ok_or_else(|| format!("missing {name}"))?;
    strip_uncertainty(raw)
        .parse::<f64>()
        .map_err(|_| format!("bad {name} '{raw}'"))
}

/// Summed-power signal-to-noise of an incoherent harmonic sum.
fn summed_snr(ipow: f64, numharm: u32) -> f64 {
    let n = f64::from(numharm.max(1));
    (ipow - n) / n.sqrt()
}

fn parse_row(file: &str, dm: f64, line: &str) -> Result<Candidate, String> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    let candnum: usize = cols
        .first()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| "bad candidate number".to_string())?;
    let sigma = num(&cols, 1, "sigma")?;
    let ipow = num(&cols, 2, "summed power")?;
    let cpow = num(&cols, 3, "coherent power")?;
    let numharm = num(&cols, 4, "harmonic count")? as u32;
    let period_ms = num(&cols, 5, "period")?;
    let freq_hz = num(&cols, 6, "frequency")?;
    let r = num(&cols, 7, "r")?;
    let z = num(&cols, 9, "z")?;
    if !(period_ms.is_finite() && period_ms > 0.0 && freq_hz.is_finite() && freq_hz > 0.0) {
        return Err(format!("non-physical period {period_ms} ms / frequency {freq_hz} Hz"));
    }
    let snr = summed_snr(ipow, numharm);
    Ok(Candidate {
        file: file.to_string(),
        candnum,
        dm,
        snr,
        sigma,
        numharm,
        ipow,
        cpow,
        period_s: period_ms / 1000.0,
        freq_hz,
        r,
        z,
        hits: vec![DmHit { dm, snr, sigma }],
        ordinal: 0,
    })
}

/// Parse the text of one result file named `file` searched at `dm`.
pub fn parse_accel_text(file: &str, dm: f64, text: &str) -> ParsedFile {
    let mut out = ParsedFile::default();
    let mut lines = text.lines().enumerate();
    let header = lines
        .by_ref()
        .find(|(_, l)| l.trim_start().starts_with("Cand") && l.contains("Sigma"));
    if header.is_none() {
        return out;
    }
    for (idx, line) in lines {
        let trimmed = line.trim();
        if trimmed.starts_with('-') && trimmed.chars().all(|c| c == '-') {
            continue;
        }
        if trimmed.is_empty() {
            break;
        }
        match parse_row(file, dm, trimmed) {
            Ok(c) => out.candidates.push(c),
            Err(reason) => out.malformed.push(ParseError::MalformedRecord {
                file: file.to_string(),
                line: idx + 1,
                reason,
            }),
        }
    }
    out
}

/// Read and parse one result file. An unreadable file is an error for the whole stage.
pub fn parse_accel_file(path: &Path, dm: f64) -> Result<ParsedFile, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(parse_accel_text(&name, dm, &text))
}
