//! Search configuration loaded from a TOML file. Built once, then passed by reference;
//! each component is handed only the slice it needs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::FatalError;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    pub resources: ResourcesSection,
    pub observation: ObservationOverrides,
    pub dedispersion: DedispersionSection,
    pub search: SearchSection,
    pub sifting: SiftingSection,
    pub folding: FoldingSection,
    pub singlepulse: SinglePulseSection,
    pub tools: ToolsSection,
    pub steps: StepsSection,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourcesSection {
    pub root_workdir: PathBuf,
    /// Worker pool size; every available thread when unset.
    pub pool_size: Option<usize>,
    pub remove_fft_files: bool,
    pub remove_segment_dat_files: bool,
    /// Existing rfifind mask. When unset and `make_rfi_mask` is on, one is built.
    pub rfi_mask: Option<PathBuf>,
    pub make_rfi_mask: bool,
    /// rfifind integration time in seconds.
    pub rfifind_time: f64,
    pub rfifind_flags: String,
    pub ignorechan: String,
}

impl Default for ResourcesSection {
    fn default() -> Self {
        Self {
            root_workdir: PathBuf::from("."),
            pool_size: None,
            remove_fft_files: false,
            remove_segment_dat_files: false,
            rfi_mask: None,
            make_rfi_mask: true,
            rfifind_time: 2.0,
            rfifind_flags: String::new(),
            ignorechan: String::new(),
        }
    }
}

/// Header values that replace what the header tool reported.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservationOverrides {
    pub source_name: Option<String>,
    pub num_samples: Option<u64>,
    pub sample_time_s: Option<f64>,
    pub num_channels: Option<u32>,
    pub bandwidth_mhz: Option<f64>,
    pub centre_freq_mhz: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DedispersionSection {
    /// Ask the external planner for the DM plan; otherwise use `dm_steps`.
    pub use_ddplan: bool,
    pub dm_min: f64,
    pub dm_max: f64,
    /// `[lo, hi, step]` triples used when the planner is off.
    pub dm_steps: Vec<[f64; 3]>,
    pub coherent_dm: f64,
    pub nsubbands: u32,
    pub max_dms_per_call: usize,
    pub prepsubband_flags: String,
}

impl Default for DedispersionSection {
    fn default() -> Self {
        Self {
            use_ddplan: true,
            dm_min: 2.0,
            dm_max: 100.0,
            dm_steps: Vec::new(),
            coherent_dm: 0.0,
            nsubbands: 0,
            max_dms_per_call: 1000,
            prepsubband_flags: String::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSection {
    pub search_full: bool,
    /// Segment lengths in minutes.
    pub segments: Vec<f64>,
    pub zmax_list: Vec<u32>,
    pub numharm: u32,
    pub jerk: bool,
    pub jerk_zmax: u32,
    pub jerk_wmax: u32,
    pub jerk_numharm: u32,
    pub period_min_s: f64,
    pub period_max_s: f64,
    /// Birdie list applied with zapbirds before the acceleration search.
    pub zaplist: Option<PathBuf>,
    pub accelsearch_flags: String,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            search_full: true,
            segments: Vec::new(),
            zmax_list: vec![0],
            numharm: 8,
            jerk: false,
            jerk_zmax: 10,
            jerk_wmax: 30,
            jerk_numharm: 4,
            period_min_s: 0.001,
            period_max_s: 15.0,
            zaplist: None,
            accelsearch_flags: String::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SiftingSection {
    pub remove_duplicates: bool,
    pub remove_dm_problems: bool,
    pub remove_harmonics: bool,
    pub min_num_dms: usize,
    pub min_dm: f64,
    pub max_harmonic: u32,
}

impl Default for SiftingSection {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            remove_dm_problems: true,
            remove_harmonics: true,
            min_num_dms: 2,
            min_dm: 2.0,
            max_harmonic: 16,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct FoldingSection {
    pub fold_known_pulsars: bool,
    pub fold_timeseries: bool,
    pub fold_rawdata: bool,
    /// Per search unit.
    pub max_candidates: usize,
    pub prepfold_flags: String,
}

impl Default for FoldingSection {
    fn default() -> Self {
        Self {
            fold_known_pulsars: false,
            fold_timeseries: true,
            fold_rawdata: false,
            max_candidates: 50,
            prepfold_flags: "-n 64 -npart 64 -fine".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SinglePulseSection {
    pub flags: String,
}

impl Default for SinglePulseSection {
    fn default() -> Self {
        Self {
            flags: "-b -m 300".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsSection {
    /// PRESTO install root. Falls back to the `PRESTO` environment variable (or `.env`).
    pub presto: Option<PathBuf>,
}

/// Per-stage switches. A disabled stage builds no Tasks.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StepsSection {
    pub rfifind: bool,
    pub dedisperse: bool,
    pub realfft: bool,
    pub rednoise: bool,
    pub accelsearch: bool,
    pub sifting: bool,
    pub folding: bool,
    pub singlepulse: bool,
}

impl Default for StepsSection {
    fn default() -> Self {
        Self {
            rfifind: true,
            dedisperse: true,
            realfft: true,
            rednoise: true,
            accelsearch: true,
            sifting: true,
            folding: true,
            singlepulse: false,
        }
    }
}

/// Command-line values that win over the file.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub root_workdir: Option<PathBuf>,
    pub pool_size: Option<usize>,
    pub fold: Option<bool>,
    pub singlepulse: Option<bool>,
}

/// Overwrite a config field when the override is present.
macro_rules! apply_override {
    ($src:expr, $src_field:ident => $dst:expr) => {
        if let Some(v) = $src.$src_field.clone() {
            $dst = v;
        }
    };
}

impl SearchConfig {
    /// Read and validate `path`. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: SearchConfig =
            toml::from_str(&text).with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, o: &ConfigOverrides) {
        apply_override!(o, root_workdir => self.resources.root_workdir);
        if o.pool_size.is_some() {
            self.resources.pool_size = o.pool_size;
        }
        apply_override!(o, fold => self.steps.folding);
        apply_override!(o, singlepulse => self.steps.singlepulse);
    }

    /// Reject values no stage could run with.
    pub fn validate(&self) -> Result<(), FatalError> {
        let invalid = |msg: String| Err(FatalError::InvalidConfig(msg));
        let d = &self.dedispersion;
        if d.coherent_dm < 0.0 {
            return Err(FatalError::NegativeCoherentDm(d.coherent_dm));
        }
        if d.max_dms_per_call == 0 {
            return invalid("dedispersion.max_dms_per_call must be positive".into());
        }
        if d.use_ddplan && d.dm_max <= d.dm_min {
            return invalid(format!(
                "dedispersion.dm_max ({}) must exceed dm_min ({})",
                d.dm_max, d.dm_min
            ));
        }
        if !d.use_ddplan && d.dm_steps.is_empty() {
            return invalid("dedispersion.dm_steps is empty and use_ddplan is off".into());
        }
        let s = &self.search;
        if let Some(bad) = s.segments.iter().find(|m| **m <= 0.0) {
            return invalid(format!("search.segments contains a non-positive length ({bad})"));
        }
        if s.zmax_list.is_empty() {
            return invalid("search.zmax_list is empty".into());
        }
        if s.period_min_s >= s.period_max_s {
            return invalid(format!(
                "search.period_min_s ({}) must be below period_max_s ({})",
                s.period_min_s, s.period_max_s
            ));
        }
        if self.sifting.max_harmonic == 0 {
            return invalid("sifting.max_harmonic must be at least 1".into());
        }
        Ok(())
    }

    /// PRESTO root from the config, or the `PRESTO` environment variable.
    pub fn presto_root(&self) -> Option<PathBuf> {
        self.tools
            .presto
            .clone()
            .or_else(|| std::env::var_os("PRESTO").map(PathBuf::from))
    }
}
