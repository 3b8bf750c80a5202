//! Work-directory layout and per-stage Task construction. Only the Tasks differ between
//! stages; they all run through the same pool.

use std::path::{Path, PathBuf};

use crate::error::PlanError;
use crate::plan::{PlanRequest, ddplan_command};
use crate::task::{MarkerKey, OutputPolicy, Task};
use crate::types::{Candidate, Chunk, DedispersionScheme, Observation, SearchUnit};
use crate::utils::config::{RFIFIND_FAILURE_PHRASES, WorkDirs};
use crate::utils::search_toml::SearchConfig;

/// Directory layout under the root work directory.
#[derive(Clone, Debug)]
pub struct WorkLayout {
    pub root: PathBuf,
}

impl WorkLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn markers(&self) -> PathBuf {
        self.root.join(WorkDirs::MARKERS)
    }

    /// `LOG/<stage>/<unit>.txt`
    pub fn log(&self, stage: &str, unit: &str) -> PathBuf {
        self.root
            .join(WorkDirs::LOGS)
            .join(stage)
            .join(format!("{}.txt", unit.replace(['/', '\\'], "_")))
    }

    pub fn rfifind(&self) -> PathBuf {
        self.root.join(WorkDirs::RFIFIND)
    }

    pub fn birdies(&self) -> PathBuf {
        self.root.join(WorkDirs::BIRDIES)
    }

    pub fn dedispersion(&self, obs: &str, unit: &SearchUnit) -> PathBuf {
        self.root
            .join(WorkDirs::DEDISPERSION)
            .join(obs)
            .join(&unit.segment)
            .join(&unit.chunk)
    }

    pub fn sifting(&self, obs: &str, unit: &SearchUnit) -> PathBuf {
        self.root
            .join(WorkDirs::SIFTING)
            .join(obs)
            .join(&unit.segment)
            .join(&unit.chunk)
    }

    pub fn summary(&self, obs: &str) -> PathBuf {
        self.root
            .join(WorkDirs::SIFTING)
            .join(obs)
            .join(format!("{obs}_cands.summary"))
    }

    pub fn folding(&self, obs: &str) -> PathBuf {
        self.root.join(WorkDirs::FOLDING).join(obs)
    }

    pub fn singlepulse(&self, obs: &str) -> PathBuf {
        self.root.join(WorkDirs::SINGLEPULSE).join(obs)
    }

    pub fn known_pulsars(&self) -> PathBuf {
        self.root.join(WorkDirs::KNOWN_PULSARS)
    }

    pub fn create_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.markers(),
            self.root.join(WorkDirs::LOGS),
            self.rfifind(),
            self.birdies(),
            self.root.join(WorkDirs::DEDISPERSION),
            self.root.join(WorkDirs::SIFTING),
            self.root.join(WorkDirs::FOLDING),
            self.root.join(WorkDirs::SINGLEPULSE),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// `name` in the directory of `path`.
fn sibling(path: &Path, name: String) -> PathBuf {
    path.with_file_name(name)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn dir_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Round down to an even sample count; the FFT stage needs even lengths.
pub fn even_samples(n: f64) -> u64 {
    let n = n.max(0.0) as u64;
    n - n % 2
}

/// Header report of `file`, saved under the rfifind directory for parsing. Runs before the
/// Observation exists, so it only needs the layout.
pub fn header_task(layout: &WorkLayout, file: &Path) -> (Task, PathBuf) {
    let base = stem(file);
    let report = layout.rfifind().join(format!("{base}.header.txt"));
    let cmd = format!(
        "{} > {}",
        crate::observation::header_command(file),
        report.display()
    );
    let log = layout.log("readfile", &base);
    let task = Task::new(MarkerKey::new("readfile", base), cmd, layout.rfifind(), log)
        .with_outputs(OutputPolicy::Required(vec![report.clone()]));
    (task, report)
}

/// Builds the Tasks of every stage for one observation.
pub struct StageBuilder<'a> {
    pub layout: &'a WorkLayout,
    pub config: &'a SearchConfig,
    pub obs: &'a Observation,
    pub mask: Option<&'a Path>,
}

impl StageBuilder<'_> {
    fn base(&self) -> String {
        self.obs.basename()
    }

    fn task(&self, stage: &str, unit: String, command: String, workdir: PathBuf) -> Task {
        let log = self.layout.log(stage, &unit);
        Task::new(MarkerKey::new(stage, unit), command, workdir, log)
    }

    /// RFI mask Task and the mask it produces.
    pub fn rfifind_task(&self) -> (Task, PathBuf) {
        let r = &self.config.resources;
        let dir = self.layout.rfifind();
        let out = format!("{}_rfifind", self.base());
        let mut cmd = format!("rfifind -noweights -time {} -o {}", r.rfifind_time, self.base());
        if !r.rfifind_flags.is_empty() {
            cmd.push_str(&format!(" {}", r.rfifind_flags));
        }
        if !r.ignorechan.is_empty() {
            cmd.push_str(&format!(" -ignorechan {}", r.ignorechan));
        }
        cmd.push_str(&format!(" {}", self.obs.file.display()));
        let outputs = ["bytemask", "inf", "mask", "ps", "rfi", "stats"]
            .iter()
            .map(|ext| dir.join(format!("{out}.{ext}")))
            .collect();
        let mask = dir.join(format!("{out}.mask"));
        let task = self
            .task("rfifind", self.base(), cmd, dir)
            .with_outputs(OutputPolicy::Required(outputs))
            .with_failure_phrases(RFIFIND_FAILURE_PHRASES);
        (task, mask)
    }

    pub fn plan_request(&self) -> PlanRequest {
        let d = &self.config.dedispersion;
        PlanRequest {
            lo_dm: d.dm_min,
            high_dm: d.dm_max,
            coherent_dm: d.coherent_dm,
            max_dms_per_call: d.max_dms_per_call,
            nsubbands: d.nsubbands,
            centre_freq_mhz: self.obs.centre_freq_mhz,
            bandwidth_mhz: self.obs.bandwidth_mhz,
            num_channels: self.obs.num_channels,
            sample_time_s: self.obs.sample_time_s,
        }
    }

    /// DM planner run, its text report saved for parsing.
    pub fn ddplan_task(&self) -> Result<(Task, PathBuf), PlanError> {
        let dir = self.layout.root.join(WorkDirs::DEDISPERSION);
        let report = dir.join(format!("ddplan_{}.txt", self.base()));
        let cmd = format!(
            "{} > {}",
            ddplan_command(&self.base(), &self.plan_request())?,
            report.display()
        );
        let task = self
            .task("ddplan", self.base(), cmd, dir)
            .with_outputs(OutputPolicy::Required(vec![report.clone()]));
        Ok((task, report))
    }

    /// One dedispersion Task per scheme for `unit`, restricted to `chunk` for segments.
    pub fn dedisperse_tasks(
        &self,
        unit: &SearchUnit,
        chunk: &Chunk,
        is_full: bool,
        schemes: &[DedispersionScheme],
    ) -> Vec<Task> {
        let d = &self.config.dedispersion;
        let r = &self.config.resources;
        let dir = self.layout.dedispersion(&self.base(), unit);
        let outbase = format!("{}_{}", self.base(), unit.tag());
        let nsub = if d.nsubbands == 0 {
            self.obs.num_channels
        } else {
            d.nsubbands
        };
        let duration = self.obs.duration_s();

        schemes
            .iter()
            .map(|s| {
                let mut cmd = String::from("prepsubband");
                if !d.prepsubband_flags.is_empty() {
                    cmd.push_str(&format!(" {}", d.prepsubband_flags));
                }
                cmd.push_str(&format!(" -o {outbase}"));
                if !r.ignorechan.is_empty() {
                    cmd.push_str(&format!(" -ignorechan {}", r.ignorechan));
                }
                if let Some(mask) = self.mask {
                    cmd.push_str(&format!(" -mask {}", mask.display()));
                }
                if !is_full {
                    let samples = chunk.length_s / (self.obs.sample_time_s * f64::from(s.downsamp));
                    cmd.push_str(&format!(
                        " -start {:.6} -numout {}",
                        chunk.start_s / duration,
                        even_samples(samples)
                    ));
                }
                cmd.push_str(&format!(
                    " -lodm {:.3} -dmstep {} -numdms {} -downsamp {} -nsub {} {}",
                    s.lo_dm,
                    s.d_dm,
                    s.num_dms,
                    s.downsamp,
                    nsub,
                    self.obs.file.display()
                ));
                let outputs = s
                    .dm_values()
                    .iter()
                    .flat_map(|dm| {
                        ["dat", "inf"]
                            .map(|ext| dir.join(format!("{outbase}_DM{dm:.2}.{ext}")))
                    })
                    .collect();
                let key = format!("{outbase}_DM{:.2}-{:.2}", s.lo_dm, s.high_dm);
                self.task("prepsubband", key, cmd, dir.clone())
                    .with_outputs(OutputPolicy::Required(outputs))
            })
            .collect()
    }

    /// `realfft` per time series.
    pub fn realfft_tasks(&self, dats: &[PathBuf]) -> Vec<Task> {
        dats.iter()
            .map(|dat| {
                let fft = dat.with_extension("fft");
                self.task("realfft", stem(dat), format!("realfft {}", dat.display()), dir_of(dat))
                    .with_outputs(OutputPolicy::Required(vec![fft]))
            })
            .collect()
    }

    /// Red-noise removal; the `_red` products replace the originals.
    pub fn rednoise_tasks(&self, ffts: &[PathBuf]) -> Vec<Task> {
        ffts.iter()
            .map(|fft| {
                let s = stem(fft);
                let cmd = format!(
                    "rednoise {s}.fft && mv -f {s}_red.fft {s}.fft && mv -f {s}_red.inf {s}.inf"
                );
                self.task("rednoise", s, cmd, dir_of(fft))
                    .with_outputs(OutputPolicy::Required(vec![fft.clone()]))
            })
            .collect()
    }

    /// Zap birdies listed in `zaplist` from each spectrum in place.
    pub fn zapbirds_tasks(&self, ffts: &[PathBuf], zaplist: &Path) -> Vec<Task> {
        ffts.iter()
            .map(|fft| {
                let cmd = format!("zapbirds -zap -zapfile {} {}", zaplist.display(), fft.display());
                self.task("zapbirds", stem(fft), cmd, dir_of(fft))
                    .with_outputs(OutputPolicy::Required(vec![fft.clone()]))
            })
            .collect()
    }

    fn search_task(&self, stage: String, fft: &Path, suffix: String, cmd: String) -> Task {
        let s = stem(fft);
        let result = sibling(fft, format!("{s}{suffix}"));
        let outputs = vec![
            result.clone(),
            sibling(fft, format!("{s}{suffix}.cand")),
            sibling(fft, format!("{s}{suffix}.txtcand")),
        ];
        let sentinel = sibling(fft, format!("{s}{suffix}_empty"));
        self.task(&stage, s, cmd, dir_of(fft))
            .with_outputs(OutputPolicy::EmptyAllowed { outputs, sentinel })
    }

    /// Acceleration search of every spectrum at every `zmax`. An empty result is recorded
    /// with a `_ACCEL_<z>_empty` sentinel.
    pub fn accel_tasks(&self, ffts: &[PathBuf]) -> Vec<Task> {
        let s = &self.config.search;
        s.zmax_list
            .iter()
            .flat_map(|&z| {
                ffts.iter().map(move |fft| {
                    let mut cmd = format!("accelsearch -zmax {z} -numharm {}", s.numharm);
                    if !s.accelsearch_flags.is_empty() {
                        cmd.push_str(&format!(" {}", s.accelsearch_flags));
                    }
                    cmd.push_str(&format!(" {}", fft.display()));
                    self.search_task(format!("accelsearch_z{z}"), fft, format!("_ACCEL_{z}"), cmd)
                })
            })
            .collect()
    }

    /// Jerk search (`-wmax`) of every spectrum.
    pub fn jerk_tasks(&self, ffts: &[PathBuf]) -> Vec<Task> {
        let s = &self.config.search;
        let (z, w) = (s.jerk_zmax, s.jerk_wmax);
        ffts.iter()
            .map(|fft| {
                let mut cmd = format!("accelsearch -zmax {z} -wmax {w} -numharm {}", s.jerk_numharm);
                if !s.accelsearch_flags.is_empty() {
                    cmd.push_str(&format!(" {}", s.accelsearch_flags));
                }
                cmd.push_str(&format!(" {}", fft.display()));
                self.search_task(
                    format!("jerksearch_z{z}_w{w}"),
                    fft,
                    format!("_ACCEL_{z}_JERK_{w}"),
                    cmd,
                )
            })
            .collect()
    }

    /// prepfold Tasks for `cands` of `unit`. Time-series folds need the unit's `.dat` files and
    /// are skipped for segments whose series are removed after the search; raw-data folds read
    /// the observation with the same DM and chunk window.
    pub fn fold_tasks(
        &self,
        unit: &SearchUnit,
        chunk: &Chunk,
        is_full: bool,
        cands: &[Candidate],
    ) -> Vec<Task> {
        let f = &self.config.folding;
        let dedisp = self.layout.dedispersion(&self.base(), unit);
        let out_dir = self.layout.folding(&self.base());
        let timeseries =
            f.fold_timeseries && (is_full || !self.config.resources.remove_segment_dat_files);
        let mut tasks = Vec::new();
        for c in cands {
            let accelfile = dedisp.join(format!("{}.cand", c.file));
            let series = c.file.split("_ACCEL").next().unwrap_or(&c.file).to_string();
            let flags = if f.prepfold_flags.is_empty() {
                String::new()
            } else {
                format!(" {}", f.prepfold_flags)
            };

            if timeseries {
                let dat = dedisp.join(format!("{series}.dat"));
                let name = format!("{}_Cand{}_ts", c.file, c.candnum);
                let cmd = format!(
                    "prepfold -nosearch{flags} -noxwin -accelcand {} -accelfile {} -o {name} {}",
                    c.candnum,
                    accelfile.display(),
                    dat.display()
                );
                tasks.push(self.task("prepfold_ts", name, cmd, out_dir.clone()));
            }
            if f.fold_rawdata {
                let name = format!("{}_Cand{}_raw", c.file, c.candnum);
                let mut cmd = format!(
                    "prepfold -nosearch{flags} -noxwin -dm {:.2} -accelcand {} -accelfile {}",
                    c.dm,
                    c.candnum,
                    accelfile.display()
                );
                if let Some(mask) = self.mask {
                    cmd.push_str(&format!(" -mask {}", mask.display()));
                }
                if !self.config.resources.ignorechan.is_empty() {
                    cmd.push_str(&format!(" -ignorechan {}", self.config.resources.ignorechan));
                }
                if !is_full {
                    let t = self.obs.duration_s();
                    cmd.push_str(&format!(
                        " -start {:.6} -end {:.6}",
                        chunk.start_s / t,
                        (chunk.start_s + chunk.length_s) / t
                    ));
                }
                cmd.push_str(&format!(" -o {name} {}", self.obs.file.display()));
                tasks.push(self.task("prepfold_raw", name, cmd, out_dir.clone()));
            }
        }
        tasks
    }

    /// Single-pulse search of each time series; the `.singlepulse` tables are moved to the
    /// observation's single-pulse directory.
    pub fn singlepulse_tasks(&self, dats: &[PathBuf]) -> Vec<Task> {
        let flags = &self.config.singlepulse.flags;
        let out_dir = self.layout.singlepulse(&self.base());
        dats.iter()
            .map(|dat| {
                let s = stem(dat);
                let cmd = format!(
                    "single_pulse_search.py {flags} {s}.dat && mv -f {s}.singlepulse {}/",
                    out_dir.display()
                );
                let table = out_dir.join(format!("{s}.singlepulse"));
                self.task("singlepulse", s, cmd, dir_of(dat))
                    .with_outputs(OutputPolicy::Required(vec![table]))
            })
            .collect()
    }
}
