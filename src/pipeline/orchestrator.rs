//! Drives one search run: per observation, header → mask → structure → plan → budget, then
//! per search unit the dedispersion and search stages, sifting, classification and folding.
//! Every stage after the first is a separate pool batch; the cancel flag is checked between
//! them.

use anyhow::{Context, Result, bail};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::budget::{BudgetRequest, ensure_disk_budget};
use crate::engine::tools::{check_input_file, expand_observation_glob, list_matching};
use crate::error::FatalError;
use crate::known::load_catalog;
use crate::observation::parse_header_report;
use crate::pipeline::context::ExecContext;
use crate::pipeline::error_handler::{check_for_cancel, report_batch};
use crate::pipeline::mask::{cached_zapped_fraction, check_zapped_fraction};
use crate::pipeline::pool::run_batch;
use crate::pipeline::stages::{StageBuilder, WorkLayout, header_task};
use crate::plan::{check_coherent_dm, parse_ddplan_report, plan_from_steps, total_trials};
use crate::report::{CandidateClass, ClassifiedCandidate, classify, write_summary};
use crate::sift::{
    SiftPolicy, accel_patterns, discover_results, load_candidates, read_candlist, sift,
    write_candlist,
};
use crate::structure::build_structure;
use crate::task::{MarkerKey, Task};
use crate::types::{
    Candidate, Chunk, DedispersionScheme, KnownPulsar, Observation, SearchUnit, Segment,
};
use crate::utils::config::{FileNames, PackagePaths, WorkerLimits};
use crate::utils::search_toml::SearchConfig;

/// Counts for one search unit in the run summary.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UnitSummary {
    pub segment: String,
    pub chunk: String,
    pub candidates: usize,
    pub new: usize,
    pub known: usize,
    pub likely_rfi: usize,
    pub failed_tasks: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ObservationSummary {
    pub observation: String,
    pub source_name: String,
    pub duration_s: f64,
    pub dm_schemes: usize,
    pub dm_trials: usize,
    pub units: Vec<UnitSummary>,
    pub folded: usize,
    pub failed_tasks: usize,
}

/// Machine-readable outcome, written as JSON to the root work directory.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub started: String,
    pub dry_run: bool,
    pub observations: Vec<ObservationSummary>,
}

impl RunSummary {
    pub fn failed_tasks(&self) -> usize {
        self.observations.iter().map(|o| o.failed_tasks).sum()
    }
}

/// Search every observation matching `observation_glob`. With `dry_run` the run stops after
/// the disk budget check of each observation.
pub fn run_search(
    config: &SearchConfig,
    observation_glob: &str,
    ctx: &ExecContext,
    dry_run: bool,
) -> Result<RunSummary> {
    let files = expand_observation_glob(observation_glob)?;
    let mut inputs = Vec::with_capacity(files.len());
    for file in &files {
        check_input_file(file)?;
        inputs.push(absolute(file)?);
    }

    let root = &config.resources.root_workdir;
    std::fs::create_dir_all(root).with_context(|| format!("create {}", root.display()))?;
    let layout = WorkLayout::new(absolute(root)?);
    layout
        .create_dirs()
        .with_context(|| format!("create work directories in {}", layout.root.display()))?;

    let pool = WorkerLimits::current().resolve(config.resources.pool_size);
    let catalog = load_catalog(&layout.known_pulsars());
    info!(
        "{} observation(s), {pool} worker(s), {} known pulsar(s)",
        inputs.len(),
        catalog.len()
    );

    let mut summary = RunSummary {
        started: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        dry_run,
        observations: Vec::new(),
    };
    for file in &inputs {
        info!("Observation {}", file.display());
        let search = ObservationSearch {
            config,
            layout: &layout,
            ctx,
            pool,
            catalog: &catalog,
        };
        summary.observations.push(search.run(file, dry_run)?);
        check_for_cancel(ctx)?;
    }

    let path = layout.root.join(PackagePaths::get().summary_filename());
    let json = serde_json::to_string_pretty(&summary)?;
    std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    debug!("Run summary written to {}", path.display());
    Ok(summary)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("resolve {}", path.display()))
}

/// Results of one search unit, kept until classification and folding.
struct UnitResult {
    unit: SearchUnit,
    chunk: Chunk,
    is_full: bool,
    classified: Vec<ClassifiedCandidate>,
    failed: usize,
}

struct ObservationSearch<'a> {
    config: &'a SearchConfig,
    layout: &'a WorkLayout,
    ctx: &'a ExecContext,
    pool: usize,
    catalog: &'a [KnownPulsar],
}

impl ObservationSearch<'_> {
    /// Run one batch, log its outcome and stop if cancelled. Returns the failed count.
    fn stage(&self, name: &str, tasks: &[Task]) -> Result<usize> {
        if tasks.is_empty() {
            return Ok(0);
        }
        let reports = run_batch(name, tasks, self.pool, self.ctx, |task, msg| {
            debug!("{}: {msg} (log: {})", task.key, task.log.display());
        });
        let summary = report_batch(name, &reports, self.ctx.verbose);
        check_for_cancel(self.ctx)?;
        Ok(summary.failed)
    }

    /// Run a single prerequisite Task; its failure stops this observation.
    fn required(&self, name: &str, task: Task) -> Result<()> {
        let log = task.log.clone();
        if self.stage(name, std::slice::from_ref(&task))? > 0 {
            bail!("{name} failed; see {}", log.display());
        }
        Ok(())
    }

    fn run(&self, file: &Path, dry_run: bool) -> Result<ObservationSummary> {
        let obs = self.read_header(file)?;
        info!(
            "{}: {} samples of {:.2} us ({:.1} s), {} channels, {:.1} MHz at {:.1} MHz",
            obs.source_name,
            obs.num_samples,
            obs.sample_time_s * 1e6,
            obs.duration_s(),
            obs.num_channels,
            obs.bandwidth_mhz,
            obs.centre_freq_mhz
        );

        let mask = self.resolve_mask(&obs, dry_run)?;
        let builder = StageBuilder {
            layout: self.layout,
            config: self.config,
            obs: &obs,
            mask: mask.as_deref(),
        };

        let s = &self.config.search;
        let segments = build_structure(obs.duration_s(), s.search_full, &s.segments);
        if segments.is_empty() {
            bail!("nothing to search: search_full is off and no segment fits the observation");
        }
        let schemes = self.build_plan(&obs, &builder)?;

        let r = &self.config.resources;
        let budget = BudgetRequest {
            total_trials: total_trials(&schemes),
            duration_s: obs.duration_s(),
            sample_time_s: obs.sample_time_s,
            segment_minutes: segments
                .iter()
                .filter_map(|seg| seg.length_s)
                .map(|l| l / 60.0)
                .collect(),
            retain_fft_files: !r.remove_fft_files,
            retain_segment_dat_files: !r.remove_segment_dat_files,
        };
        ensure_disk_budget(&budget, &self.layout.root)?;

        let mut summary = ObservationSummary {
            observation: obs.basename(),
            source_name: obs.source_name.clone(),
            duration_s: obs.duration_s(),
            dm_schemes: schemes.len(),
            dm_trials: total_trials(&schemes),
            ..Default::default()
        };
        if dry_run {
            info!("Dry run: stopping before dedispersion");
            return Ok(summary);
        }

        let mut results = Vec::new();
        for segment in &segments {
            for chunk in &segment.chunks {
                results.push(self.search_unit(&builder, &schemes, segment, chunk)?);
            }
        }

        let table: Vec<(SearchUnit, Vec<ClassifiedCandidate>)> = results
            .iter()
            .map(|u| (u.unit.clone(), u.classified.clone()))
            .collect();
        let summary_path = self.layout.summary(&obs.basename());
        write_summary(&summary_path, &obs.basename(), &table)
            .with_context(|| format!("write {}", summary_path.display()))?;
        info!("Candidate summary written to {}", summary_path.display());

        let (folded, fold_failed) = self.fold(&builder, &results)?;
        let sp_failed = self.single_pulse(&builder, &obs, &results)?;

        summary.folded = folded;
        summary.failed_tasks =
            results.iter().map(|u| u.failed).sum::<usize>() + fold_failed + sp_failed;
        summary.units = results.iter().map(unit_summary).collect();
        Ok(summary)
    }

    fn read_header(&self, file: &Path) -> Result<Observation> {
        let (task, report) = header_task(self.layout, file);
        self.required("readfile", task)?;
        let text = std::fs::read_to_string(&report)
            .with_context(|| format!("read header report {}", report.display()))?;
        Ok(parse_header_report(file, &text, &self.config.observation)?)
    }

    /// Configured mask, or one built with rfifind. Skipped in a dry run.
    fn resolve_mask(&self, obs: &Observation, dry_run: bool) -> Result<Option<PathBuf>> {
        let r = &self.config.resources;
        let mask = if let Some(mask) = &r.rfi_mask {
            if !mask.is_file() {
                return Err(FatalError::MissingMask(mask.clone()).into());
            }
            absolute(mask)?
        } else if self.config.steps.rfifind && r.make_rfi_mask && !dry_run {
            let builder = StageBuilder {
                layout: self.layout,
                config: self.config,
                obs,
                mask: None,
            };
            let (task, mask) = builder.rfifind_task();
            self.required("rfifind", task)?;
            mask
        } else {
            info!("No RFI mask in use");
            return Ok(None);
        };

        match cached_zapped_fraction(&mask) {
            Ok(fraction) => check_zapped_fraction(fraction)?,
            Err(e) => warn!("Could not read the masked fraction: {e:#}"),
        }
        Ok(Some(mask))
    }

    fn build_plan(
        &self,
        obs: &Observation,
        builder: &StageBuilder,
    ) -> Result<Vec<DedispersionScheme>> {
        let d = &self.config.dedispersion;
        check_coherent_dm(d.coherent_dm).map_err(FatalError::from)?;
        if d.nsubbands > 0 && obs.num_channels % d.nsubbands != 0 {
            return Err(FatalError::InvalidConfig(format!(
                "nsubbands ({}) must divide the channel count ({})",
                d.nsubbands, obs.num_channels
            ))
            .into());
        }

        let schemes = if d.use_ddplan {
            let (task, report) = builder.ddplan_task().map_err(FatalError::from)?;
            self.required("ddplan", task)?;
            let text = std::fs::read_to_string(&report)
                .with_context(|| format!("read DM plan {}", report.display()))?;
            parse_ddplan_report(&text, d.max_dms_per_call, d.nsubbands)
                .map_err(FatalError::from)?
        } else {
            plan_from_steps(&d.dm_steps, d.max_dms_per_call).map_err(FatalError::from)?
        };
        if schemes.is_empty() {
            return Err(FatalError::InvalidConfig("the DM plan has no trials".into()).into());
        }

        info!(
            "DM plan: {} call(s), {} trials",
            schemes.len(),
            total_trials(&schemes)
        );
        for s in &schemes {
            debug!(
                "  DM {:>9.3} - {:>9.3}  step {:<7} {:>5} trials  downsamp {}",
                s.lo_dm, s.high_dm, s.d_dm, s.num_dms, s.downsamp
            );
        }
        Ok(schemes)
    }

    /// Time series (or spectra) of a unit, without leftover `_red` intermediates.
    fn series_files(dir: &Path, prefix: &str, ext: &str) -> Vec<PathBuf> {
        list_matching(dir, &format!("{prefix}*.{ext}"))
            .into_iter()
            .filter(|p| !p.to_string_lossy().contains("_red."))
            .collect()
    }

    fn search_unit(
        &self,
        builder: &StageBuilder,
        schemes: &[DedispersionScheme],
        segment: &Segment,
        chunk: &Chunk,
    ) -> Result<UnitResult> {
        let base = builder.obs.basename();
        let unit = SearchUnit::new(segment.label.clone(), chunk.label.clone());
        let tag = unit.tag();
        let dir = self.layout.dedispersion(&base, &unit);
        std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        info!(
            "Unit {tag}: {:.1} s from {:.1} s",
            chunk.length_s, chunk.start_s
        );

        let steps = &self.config.steps;
        let prefix = format!("{base}_{tag}_DM");
        let mut failed = 0;

        if steps.dedisperse {
            let tasks = builder.dedisperse_tasks(&unit, chunk, segment.is_full(), schemes);
            failed += self.stage(&format!("prepsubband {tag}"), &tasks)?;
        }
        let dats = Self::series_files(&dir, &prefix, "dat");
        if steps.realfft {
            failed += self.stage(&format!("realfft {tag}"), &builder.realfft_tasks(&dats))?;
        }
        let ffts = Self::series_files(&dir, &prefix, "fft");
        if steps.rednoise {
            failed += self.stage(&format!("rednoise {tag}"), &builder.rednoise_tasks(&ffts))?;
        }
        if let Some(zaplist) = &self.config.search.zaplist {
            match absolute(zaplist) {
                Ok(z) => {
                    let tasks = builder.zapbirds_tasks(&ffts, &z);
                    failed += self.stage(&format!("zapbirds {tag}"), &tasks)?;
                }
                Err(e) => warn!("Birdie list unusable, not zapping: {e:#}"),
            }
        }
        if steps.accelsearch {
            failed += self.stage(&format!("accelsearch {tag}"), &builder.accel_tasks(&ffts))?;
            if self.config.search.jerk {
                failed += self.stage(&format!("jerksearch {tag}"), &builder.jerk_tasks(&ffts))?;
            }
            self.cleanup(builder, &ffts, segment.is_full());
        }

        let candidates = if steps.sifting {
            self.sift_unit(&unit, chunk, &dir, &base, failed == 0)?
        } else {
            Vec::new()
        };
        let s = &self.config.sifting;
        let classified = candidates
            .into_iter()
            .map(|candidate| ClassifiedCandidate {
                class: classify(&candidate, self.catalog, s.max_harmonic, s.min_dm),
                unit: unit.clone(),
                candidate,
            })
            .collect();

        Ok(UnitResult {
            unit,
            chunk: chunk.clone(),
            is_full: segment.is_full(),
            classified,
            failed,
        })
    }

    /// Remove spectra (and segment time series) whose searches are all marked done.
    fn cleanup(&self, builder: &StageBuilder, ffts: &[PathBuf], is_full: bool) {
        let r = &self.config.resources;
        let remove_dat = r.remove_segment_dat_files && !is_full;
        if !r.remove_fft_files && !remove_dat {
            return;
        }
        let mut removed = 0;
        for fft in ffts {
            let one = std::slice::from_ref(fft);
            let mut searches = builder.accel_tasks(one);
            if self.config.search.jerk {
                searches.extend(builder.jerk_tasks(one));
            }
            if !searches.iter().all(|t| self.ctx.markers.exists(&t.key)) {
                continue;
            }
            let mut targets = Vec::new();
            if r.remove_fft_files {
                targets.push(fft.clone());
            }
            if remove_dat {
                targets.push(fft.with_extension("dat"));
            }
            for path in targets {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Could not remove {}: {e}", path.display()),
                }
            }
        }
        if removed > 0 {
            debug!("Removed {removed} searched file(s)");
        }
    }

    fn sift_policy(&self, t_obs_s: f64) -> SiftPolicy {
        let (s, q) = (&self.config.sifting, &self.config.search);
        SiftPolicy {
            period_min_s: q.period_min_s,
            period_max_s: q.period_max_s,
            remove_duplicates: s.remove_duplicates,
            remove_dm_problems: s.remove_dm_problems,
            remove_harmonics: s.remove_harmonics,
            min_num_dms: s.min_num_dms,
            min_dm: s.min_dm,
            max_harmonic: s.max_harmonic,
            t_obs_s,
        }
    }

    /// Sift a unit's results into its candidate list. A marked unit reloads the saved list.
    /// The marker is only written when every search Task of the unit succeeded.
    fn sift_unit(
        &self,
        unit: &SearchUnit,
        chunk: &Chunk,
        dir: &Path,
        base: &str,
        searches_complete: bool,
    ) -> Result<Vec<Candidate>> {
        let tag = unit.tag();
        let out_dir = self.layout.sifting(base, unit);
        let candlist = out_dir.join(FileNames::CANDLIST);
        let key = MarkerKey::new(FileNames::SIFT_STAGE, format!("{base}_{tag}"));

        if self.ctx.markers.exists(&key) && candlist.is_file() {
            match read_candlist(&candlist) {
                Ok(cands) => {
                    info!("{tag}: already sifted, {} candidate(s)", cands.len());
                    return Ok(cands);
                }
                Err(e) => warn!("{e}; sifting {tag} again"),
            }
        }

        let q = &self.config.search;
        let jerk = q.jerk.then_some((q.jerk_zmax, q.jerk_wmax));
        let files = discover_results(dir, &accel_patterns(&q.zmax_list, jerk));
        let cands = match load_candidates(&files) {
            Ok(c) => c,
            Err(e) => {
                error!("Sifting {tag} aborted: {e}");
                return Ok(Vec::new());
            }
        };
        let found = cands.len();
        let sifted = sift(cands, &self.sift_policy(chunk.length_s));
        info!(
            "{tag}: {found} candidate(s) in {} file(s), {} after sifting",
            files.len(),
            sifted.len()
        );

        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("create {}", out_dir.display()))?;
        write_candlist(&candlist, &sifted)
            .with_context(|| format!("write {}", candlist.display()))?;
        if searches_complete {
            let note = format!("sifted {} result file(s)", files.len());
            if let Err(e) = self.ctx.markers.mark_done(&key, &note) {
                warn!("{tag}: sifting marker not written: {e}");
            }
        } else {
            warn!("{tag}: some Tasks failed; sifting will be redone on the next run");
        }
        Ok(sifted)
    }

    /// Fold the strongest selected candidates of every unit. Returns (folded, failed).
    fn fold(&self, builder: &StageBuilder, results: &[UnitResult]) -> Result<(usize, usize)> {
        if !self.config.steps.folding {
            return Ok((0, 0));
        }
        let f = &self.config.folding;
        let mut tasks = Vec::new();
        let mut selected = 0;
        for u in results {
            let picks: Vec<Candidate> = u
                .classified
                .iter()
                .filter(|c| f.fold_known_pulsars || c.class.is_new())
                .take(f.max_candidates)
                .map(|c| c.candidate.clone())
                .collect();
            selected += picks.len();
            tasks.extend(builder.fold_tasks(&u.unit, &u.chunk, u.is_full, &picks));
        }
        if tasks.is_empty() {
            info!("Nothing to fold");
            return Ok((0, 0));
        }
        let dir = self.layout.folding(&builder.obs.basename());
        std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        info!("Folding {selected} candidate(s)");
        let failed = self.stage("prepfold", &tasks)?;
        Ok((tasks.len() - failed, failed))
    }

    /// Single-pulse search of the full-length time series.
    fn single_pulse(
        &self,
        builder: &StageBuilder,
        obs: &Observation,
        results: &[UnitResult],
    ) -> Result<usize> {
        if !self.config.steps.singlepulse {
            return Ok(0);
        }
        let Some(full) = results.iter().find(|u| u.is_full) else {
            warn!("Single-pulse search needs the full-length search; skipped");
            return Ok(0);
        };
        let base = obs.basename();
        let dir = self.layout.dedispersion(&base, &full.unit);
        let prefix = format!("{base}_{}_DM", full.unit.tag());
        let dats = Self::series_files(&dir, &prefix, "dat");
        if dats.is_empty() {
            warn!("No time series left for the single-pulse search");
            return Ok(0);
        }
        std::fs::create_dir_all(self.layout.singlepulse(&base))?;
        self.stage("single_pulse_search", &builder.singlepulse_tasks(&dats))
    }
}

fn unit_summary(u: &UnitResult) -> UnitSummary {
    let mut s = UnitSummary {
        segment: u.unit.segment.clone(),
        chunk: u.unit.chunk.clone(),
        candidates: u.classified.len(),
        failed_tasks: u.failed,
        ..Default::default()
    };
    for c in &u.classified {
        match c.class {
            CandidateClass::New => s.new += 1,
            CandidateClass::Known(_) => s.known += 1,
            CandidateClass::LikelyRfi => s.likely_rfi += 1,
        }
    }
    s
}
