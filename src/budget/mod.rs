//! Static disk-usage estimate for a search, compared against free space.
//!
//! No file is read: every dedispersed time series is `samples × 4` bytes, doubled when the
//! FFT of it is kept next to it.

pub mod free_space;

use log::{info, warn};
use std::path::Path;

use crate::error::FatalError;
use crate::structure::{FULL_LABEL, segment_label, split_segment};
use crate::utils::config::BudgetConsts;

/// Inputs of the estimate. Built from the plan, the observation and `[resources]`.
#[derive(Clone, Debug)]
pub struct BudgetRequest {
    pub total_trials: usize,
    pub duration_s: f64,
    pub sample_time_s: f64,
    /// Segment lengths in minutes, excluding the full-length search.
    pub segment_minutes: Vec<f64>,
    pub retain_fft_files: bool,
    pub retain_segment_dat_files: bool,
}

/// One row of the breakdown.
#[derive(Clone, Debug, PartialEq)]
pub struct BudgetLine {
    pub label: String,
    pub bytes_per_trial: u64,
    pub chunks: usize,
    pub bytes: u64,
}

#[derive(Clone, Debug)]
pub struct BudgetReport {
    pub lines: Vec<BudgetLine>,
    /// Sum of the lines, before margin.
    pub estimate_bytes: u64,
    /// Estimate with the safety margin applied.
    pub required_bytes: u64,
    pub available_bytes: u64,
    pub sufficient: bool,
}

fn series_bytes(length_s: f64, sample_time_s: f64, retain_fft: bool) -> u64 {
    let bytes = (length_s / sample_time_s) as u64 * BudgetConsts::BYTES_PER_SAMPLE;
    if retain_fft { bytes * 2 } else { bytes }
}

/// Per-line estimate: the full-length search plus each segment's chunks.
pub fn estimate(req: &BudgetRequest) -> Vec<BudgetLine> {
    let trials = req.total_trials as u64;
    let full_per_trial = series_bytes(req.duration_s, req.sample_time_s, req.retain_fft_files);
    let mut lines = vec![BudgetLine {
        label: FULL_LABEL.to_string(),
        bytes_per_trial: full_per_trial,
        chunks: 1,
        bytes: full_per_trial * trials,
    }];

    for &minutes in &req.segment_minutes {
        let length_s = minutes * 60.0;
        let chunks = split_segment(req.duration_s, length_s).map_or(0, |c| c.len());
        let per_trial = if req.retain_segment_dat_files {
            series_bytes(length_s, req.sample_time_s, req.retain_fft_files)
        } else {
            0
        };
        lines.push(BudgetLine {
            label: segment_label(minutes),
            bytes_per_trial: per_trial,
            chunks,
            bytes: per_trial * trials * chunks as u64,
        });
    }
    lines
}

/// Compare the estimate (with margin) against `available_bytes`. Pure.
pub fn check_budget(req: &BudgetRequest, available_bytes: u64) -> BudgetReport {
    let lines = estimate(req);
    let estimate_bytes: u64 = lines.iter().map(|l| l.bytes).sum();
    let required_bytes = (estimate_bytes as f64 * BudgetConsts::MARGIN).ceil() as u64;
    BudgetReport {
        lines,
        estimate_bytes,
        required_bytes,
        available_bytes,
        sufficient: available_bytes > required_bytes,
    }
}

fn gb(bytes: u64) -> f64 {
    bytes as f64 / 1.0e9
}

/// Log the breakdown the way operators read it.
pub fn log_report(req: &BudgetRequest, report: &BudgetReport) {
    if !req.retain_fft_files {
        info!("FFT files are removed after searching");
    } else {
        info!("FFT files are kept: each DM trial takes twice the space");
    }
    for line in &report.lines {
        info!(
            "{:>6}: ~{:.2} GB ({} DM trials × {:.0} MB × {} chunk(s))",
            line.label,
            gb(line.bytes),
            req.total_trials,
            line.bytes_per_trial as f64 / 1.0e6,
            line.chunks
        );
    }
    info!(
        "Expected disk usage: ~{:.2} GB; free: ~{:.2} GB",
        gb(report.required_bytes),
        gb(report.available_bytes)
    );
}

/// Estimate, query free space under `dir`, and fail when the space is not enough.
pub fn ensure_disk_budget(req: &BudgetRequest, dir: &Path) -> Result<BudgetReport, FatalError> {
    let available = match free_space::available_bytes(dir) {
        Some(bytes) => bytes,
        None => {
            warn!(
                "Could not determine free space for {}; skipping the disk check",
                dir.display()
            );
            u64::MAX
        }
    };
    let report = check_budget(req, available);
    log_report(req, &report);
    if !report.sufficient {
        return Err(FatalError::InsufficientDisk {
            dir: dir.to_path_buf(),
            required_gb: gb(report.required_bytes),
            available_gb: gb(report.available_bytes),
        });
    }
    Ok(report)
}
