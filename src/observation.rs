//! Observation header from the text report of the external header tool (`readfile`).
//! Binary formats are never read here.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ParseError;
use crate::types::Observation;
use crate::utils::search_toml::ObservationOverrides;

/// Shell command printing the header report of `file`.
pub fn header_command(file: &Path) -> String {
    format!("readfile {}", file.display())
}

/// `key = value` pairs of the report, keys trimmed and lower-cased.
fn report_values(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect()
}

/// First value whose key starts with `prefix` (keys carry format-specific suffixes such as
/// `MJD start time (STT_*)`).
fn lookup<'a>(values: &'a HashMap<String, String>, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.to_ascii_lowercase();
    let mut keys: Vec<&String> = values.keys().filter(|k| k.starts_with(&prefix)).collect();
    keys.sort();
    keys.first().map(|k| values[*k].as_str())
}

fn number(values: &HashMap<String, String>, prefix: &str) -> Option<f64> {
    lookup(values, prefix)?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// Build the Observation for `file` from its header report, with `[observation]` values
/// taking precedence.
pub fn parse_header_report(
    file: &Path,
    text: &str,
    overrides: &ObservationOverrides,
) -> Result<Observation, ParseError> {
    let values = report_values(text);
    let missing = |key: &str| ParseError::MissingKey {
        file: file.display().to_string(),
        key: key.to_string(),
    };

    let num_samples = overrides
        .num_samples
        .or_else(|| number(&values, "Spectra per file").map(|v| v as u64))
        .ok_or_else(|| missing("Spectra per file"))?;
    let sample_time_s = overrides
        .sample_time_s
        .or_else(|| number(&values, "Sample time (us)").map(|us| us * 1e-6))
        .ok_or_else(|| missing("Sample time (us)"))?;
    let num_channels = overrides
        .num_channels
        .or_else(|| number(&values, "Number of channels").map(|v| v as u32))
        .ok_or_else(|| missing("Number of channels"))?;
    let channel_width_mhz = number(&values, "Channel width (MHz)").unwrap_or(0.0);
    let bandwidth_mhz = overrides
        .bandwidth_mhz
        .or_else(|| number(&values, "Total Bandwidth (MHz)"))
        .or_else(|| {
            (channel_width_mhz != 0.0).then(|| channel_width_mhz * f64::from(num_channels))
        })
        .ok_or_else(|| missing("Total Bandwidth (MHz)"))?;
    let centre_freq_mhz = overrides
        .centre_freq_mhz
        .or_else(|| {
            let hi = number(&values, "High channel (MHz)")?;
            let lo = number(&values, "Low channel (MHz)")?;
            Some(0.5 * (hi + lo))
        })
        .or_else(|| number(&values, "Central freq (MHz)"))
        .ok_or_else(|| missing("High channel (MHz)"))?;
    let mjd_start = number(&values, "MJD start time").unwrap_or(0.0);
    let source_name = overrides
        .source_name
        .clone()
        .or_else(|| lookup(&values, "Source name").map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    if num_samples == 0 || sample_time_s <= 0.0 {
        return Err(missing("Spectra per file"));
    }

    Ok(Observation {
        file: file.to_path_buf(),
        source_name,
        num_samples,
        sample_time_s,
        num_channels,
        channel_width_mhz,
        bandwidth_mhz,
        centre_freq_mhz,
        mjd_start,
    })
}
