//! The sifted candidate list: a header row of named columns, one candidate per row.
//! Written after sifting, read back by fold selection and on resumed runs.

use log::{debug, warn};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::error::ParseError;
use crate::types::{Candidate, DmHit};

pub const COLUMNS: [&str; 11] = [
    "file:candnum",
    "DM",
    "SNR",
    "sigma",
    "numharm",
    "ipow",
    "cpow",
    "P(ms)",
    "r",
    "z",
    "numhits",
];

pub fn format_candlist(cands: &[Candidate]) -> String {
    let mut out = format!("#{}\n", COLUMNS.join(" "));
    for c in cands {
        let _ = writeln!(
            out,
            "{} {:.2} {:.2} {:.2} {} {:.2} {:.2} {:.8} {:.2} {:.2} {}",
            c.id(),
            c.dm,
            c.snr,
            c.sigma,
            c.numharm,
            c.ipow,
            c.cpow,
            c.period_s * 1000.0,
            c.r,
            c.z,
            c.hits.len()
        );
    }
    out
}

pub fn write_candlist(path: &Path, cands: &[Candidate]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format_candlist(cands))
}

fn column<'a>(
    cols: &HashMap<&str, usize>,
    fields: &[&'a str],
    name: &str,
) -> Result<&'a str, String> {
    cols.get(name)
        .and_then(|&i| fields.get(i).copied())
        .ok_or_else(|| format!("missing {name}"))
}

fn number(cols: &HashMap<&str, usize>, fields: &[&str], name: &str) -> Result<f64, String> {
    column(cols, fields, name)?
        .parse()
        .map_err(|_| format!("bad {name}"))
}

fn parse_row(cols: &HashMap<&str, usize>, fields: &[&str]) -> Result<Candidate, String> {
    let f = |name: &str| number(cols, fields, name);
    // Columns beyond the required four default to zero when absent.
    let opt = |name: &str| {
        if cols.contains_key(name) {
            f(name)
        } else {
            Ok(0.0)
        }
    };
    let id = column(cols, fields, "file:candnum")?;
    let (file, candnum) = id
        .rsplit_once(':')
        .ok_or_else(|| format!("bad id '{id}'"))?;
    let candnum: usize = candnum.parse().map_err(|_| format!("bad id '{id}'"))?;
    let period_ms = f("P(ms)")?;
    if !(period_ms.is_finite() && period_ms > 0.0) {
        return Err(format!("bad period {period_ms}"));
    }
    let (dm, sigma) = (f("DM")?, f("sigma")?);
    let snr = opt("SNR")?;
    Ok(Candidate {
        file: file.to_string(),
        candnum,
        dm,
        snr,
        sigma,
        numharm: opt("numharm")? as u32,
        ipow: opt("ipow")?,
        cpow: opt("cpow")?,
        period_s: period_ms / 1000.0,
        freq_hz: 1000.0 / period_ms,
        r: opt("r")?,
        z: opt("z")?,
        hits: vec![DmHit { dm, snr, sigma }],
        ordinal: 0,
    })
}

/// Parse list text. Columns are found by header name; bad rows are skipped one by one.
pub fn parse_candlist(name: &str, text: &str) -> Result<Vec<Candidate>, ParseError> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let header = match lines.next() {
        Some((_, l)) if l.starts_with('#') => l.trim_start_matches('#'),
        _ => return Err(ParseError::MissingHeader(name.to_string())),
    };
    let cols: HashMap<&str, usize> = header
        .split_whitespace()
        .enumerate()
        .map(|(i, c)| (c, i))
        .collect();
    for required in ["file:candnum", "DM", "sigma", "P(ms)"] {
        if !cols.contains_key(required) {
            return Err(ParseError::MissingColumn {
                file: name.to_string(),
                column: required.to_string(),
            });
        }
    }

    let mut out = Vec::new();
    let mut skipped = 0;
    for (idx, line) in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match parse_row(&cols, &fields) {
            Ok(mut c) => {
                c.ordinal = out.len();
                out.push(c);
            }
            Err(reason) => {
                skipped += 1;
                debug!(
                    "{}",
                    ParseError::MalformedRecord {
                        file: name.to_string(),
                        line: idx + 1,
                        reason,
                    }
                );
            }
        }
    }
    if skipped > 0 {
        warn!("{name}: skipped {skipped} malformed row(s)");
    }
    Ok(out)
}

pub fn read_candlist(path: &Path) -> Result<Vec<Candidate>, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_candlist(&path.display().to_string(), &text)
}
