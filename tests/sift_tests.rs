use psrsieve::sift::candidate::strip_uncertainty;
use psrsieve::sift::candlist::{format_candlist, parse_candlist};
use psrsieve::sift::{
    SiftPolicy, accel_patterns, discover_results, dm_from_name, filter_period, load_candidates,
    parse_accel_text, read_candlist, remove_dm_problems, remove_duplicates, remove_harmonics,
    sift, write_candlist,
};
use psrsieve::{Candidate, DmHit, ParseError};

fn cand(file: &str, dm: f64, period_ms: f64, sigma: f64, ordinal: usize) -> Candidate {
    Candidate {
        file: file.to_string(),
        candnum: 1,
        dm,
        snr: sigma,
        sigma,
        numharm: 4,
        ipow: 40.0,
        cpow: 30.0,
        period_s: period_ms / 1000.0,
        freq_hz: 1000.0 / period_ms,
        r: 0.0,
        z: 0.0,
        hits: vec![DmHit {
            dm,
            snr: sigma,
            sigma,
        }],
        ordinal,
    }
}

fn policy() -> SiftPolicy {
    SiftPolicy {
        period_min_s: 0.0005,
        period_max_s: 15.0,
        remove_duplicates: true,
        remove_dm_problems: true,
        remove_harmonics: true,
        min_num_dms: 2,
        min_dm: 2.0,
        max_harmonic: 16,
        t_obs_s: 60.0,
    }
}

// --- period cut ---

#[test]
fn test_period_cut() {
    let mut p = policy();
    p.period_min_s = 0.002;
    p.period_max_s = 1.0;
    let out = filter_period(
        vec![
            cand("a", 10.0, 1.0, 5.0, 0),
            cand("b", 10.0, 5.0, 5.0, 1),
            cand("c", 10.0, 2000.0, 5.0, 2),
        ],
        &p,
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].file, "b");
}

// --- duplicates ---

#[test]
fn test_duplicate_keeps_strongest() {
    let out = remove_duplicates(
        vec![
            cand("DM10.00", 10.00, 5.000, 8.0, 0),
            cand("DM10.05", 10.05, 5.0002, 6.0, 1),
        ],
        &policy(),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].sigma, 8.0);
    assert_eq!(out[0].hits.len(), 2);
    assert_eq!(out[0].distinct_dm_count(), 2);
}

#[test]
fn test_distinct_frequencies_are_not_duplicates() {
    let out = remove_duplicates(
        vec![cand("a", 10.0, 5.0, 8.0, 0), cand("b", 10.0, 7.0, 6.0, 1)],
        &policy(),
    );
    assert_eq!(out.len(), 2);
}

#[test]
fn test_sift_scenario_duplicate_pair() {
    let out = sift(
        vec![
            cand("DM10.05", 10.05, 5.0002, 6.0, 0),
            cand("DM10.00", 10.00, 5.000, 8.0, 1),
        ],
        &policy(),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].file, "DM10.00");
}

// --- DM problems ---

#[test]
fn test_narrow_low_dm_detection_is_rfi() {
    let out = remove_dm_problems(vec![cand("a", 0.5, 5.0, 9.0, 0)], &policy());
    assert!(out.is_empty());
}

#[test]
fn test_low_dm_seen_at_many_dms_is_kept() {
    let mut c = cand("a", 0.5, 5.0, 9.0, 0);
    c.hits.push(DmHit {
        dm: 1.0,
        snr: 5.0,
        sigma: 5.0,
    });
    let out = remove_dm_problems(vec![c], &policy());
    assert_eq!(out.len(), 1);
}

#[test]
fn test_single_dm_detection_at_high_dm_is_kept() {
    let out = remove_dm_problems(vec![cand("a", 50.0, 5.0, 9.0, 0)], &policy());
    assert_eq!(out.len(), 1);
}

#[test]
fn test_dm_filter_uses_peak_dm() {
    let mut c = cand("a", 30.0, 5.0, 4.0, 0);
    c.hits = vec![DmHit {
        dm: 1.0,
        snr: 9.0,
        sigma: 9.0,
    }];
    assert_eq!(c.peak_dm(), 1.0);
    assert!(remove_dm_problems(vec![c], &policy()).is_empty());
}

// --- harmonics ---

#[test]
fn test_harmonic_at_similar_dm_is_removed() {
    let out = remove_harmonics(
        vec![
            cand("fund", 20.0, 10.0, 12.0, 0),
            cand("second", 20.3, 5.0, 7.0, 1),
            cand("third", 19.8, 10.0 / 3.0, 6.0, 2),
        ],
        &policy(),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].file, "fund");
}

#[test]
fn test_harmonic_at_distant_dm_is_kept() {
    let out = remove_harmonics(
        vec![
            cand("fund", 20.0, 10.0, 12.0, 0),
            cand("other", 80.0, 5.0, 7.0, 1),
        ],
        &policy(),
    );
    assert_eq!(out.len(), 2);
}

#[test]
fn test_unrelated_periods_are_kept() {
    let out = remove_harmonics(
        vec![
            cand("a", 20.0, 10.0, 12.0, 0),
            cand("b", 20.0, 7.3, 7.0, 1),
        ],
        &policy(),
    );
    assert_eq!(out.len(), 2);
}

#[test]
fn test_unusable_frequency_is_skipped_alone() {
    let mut broken = cand("broken", 20.0, 10.0, 20.0, 0);
    broken.freq_hz = f64::NAN;
    let out = remove_harmonics(
        vec![broken, cand("fine", 20.0, 10.0, 12.0, 1)],
        &policy(),
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].file, "fine");
}

// --- whole pipeline ---

fn mixed_set() -> Vec<Candidate> {
    let mut v = vec![
        cand("p1", 30.0, 4.0, 10.0, 0),
        cand("p1dup", 30.5, 4.00005, 9.0, 1),
        cand("p1half", 30.2, 2.0, 6.0, 2),
        cand("rfi", 0.0, 16.6667, 15.0, 3),
        cand("p2", 60.0, 123.4, 7.5, 4),
        cand("p3", 45.0, 33.0, 7.5, 5),
        cand("fast", 12.0, 0.1, 20.0, 6),
    ];
    v[0].hits.push(DmHit {
        dm: 29.5,
        snr: 8.0,
        sigma: 8.0,
    });
    v
}

#[test]
fn test_sift_output_sorted_with_stable_ties() {
    let out = sift(mixed_set(), &policy());
    let files: Vec<&str> = out.iter().map(|c| c.file.as_str()).collect();
    assert_eq!(files, vec!["p1", "p2", "p3"]);
    assert!(out.windows(2).all(|w| w[0].sigma >= w[1].sigma));
}

#[test]
fn test_sift_is_idempotent() {
    let once = sift(mixed_set(), &policy());
    let twice = sift(once.clone(), &policy());
    assert_eq!(once, twice);

    let mut p = policy();
    p.remove_harmonics = false;
    let once = sift(mixed_set(), &p);
    assert_eq!(sift(once.clone(), &p), once);
}

#[test]
fn test_sift_empty_input() {
    assert!(sift(Vec::new(), &policy()).is_empty());
}

#[test]
fn test_disabled_stages_keep_candidates() {
    let p = SiftPolicy {
        remove_duplicates: false,
        remove_dm_problems: false,
        remove_harmonics: false,
        ..policy()
    };
    // Only the 0.1 ms candidate falls outside the period range.
    assert_eq!(sift(mixed_set(), &p).len(), 6);
}

// --- result file parsing ---

const ACCEL_TEXT: &str = "\
             Summed  Coherent  Num        Period          Frequency         FFT 'r'        Freq Deriv       FFT 'z'         Accel
Cand  Sigma   Power    Power   Harm        (ms)              (Hz)            (bin)          (Hz/s)         (bins)         (m/s^2)
---------------------------------------------------------------------------------------------------------------------------------------
1     12.34   80.12    60.50    8     5.00123(12)       199.9508(48)      11997.05(29)     1.2(3.4)e-05    0.7(2.0)       0.70(2.0)
2      6.78   30.00    22.10    4   123.456(7)          8.100184(48)     486.01(29)      -1.3(6.6)e-05   -0.8(4.0)      -1.9(9.6)
3      bad    row
4      5.10   20.00    15.00    2     0.000(0)           0.0               0.0             0.0            0.0            0.0

             Summed  Coherent  Num        Period          Frequency         FFT 'r'        Freq Deriv       FFT 'z'         Accel
Cand  Sigma   Power    Power   Harm        (ms)              (Hz)            (bin)          (Hz/s)         (bins)         (m/s^2)
1     12.34   80.12    60.50    1     5.00123(12)       199.9508(48)      11997.05(29)     1.2(3.4)e-05    0.7(2.0)       0.70(2.0)
";

#[test]
fn test_parse_accel_text() {
    let parsed = parse_accel_text("obs_full_ck00_DM12.30_ACCEL_0", 12.3, ACCEL_TEXT);
    assert_eq!(parsed.candidates.len(), 2);
    assert_eq!(parsed.malformed.len(), 2);
    assert!(matches!(
        parsed.malformed[0],
        ParseError::MalformedRecord { line: 6, .. }
    ));

    let c = &parsed.candidates[0];
    assert_eq!(c.candnum, 1);
    assert_eq!(c.sigma, 12.34);
    assert_eq!(c.numharm, 8);
    assert!((c.period_s - 0.00500123).abs() < 1e-12);
    assert!((c.freq_hz - 199.9508).abs() < 1e-9);
    assert_eq!(c.z, 0.7);
    assert_eq!(c.dm, 12.3);
    assert_eq!(c.hits.len(), 1);
    assert!((c.snr - (80.12 - 8.0) / 8f64.sqrt()).abs() < 1e-9);
    assert_eq!(c.id(), "obs_full_ck00_DM12.30_ACCEL_0:1");

    assert_eq!(parsed.candidates[1].z, -0.8);
}

#[test]
fn test_parse_accel_text_without_table() {
    let parsed = parse_accel_text("x", 1.0, "no candidates\n");
    assert!(parsed.candidates.is_empty());
    assert!(parsed.malformed.is_empty());
}

#[test]
fn test_dm_from_name() {
    assert_eq!(dm_from_name("obs_full_ck00_DM12.30_ACCEL_0"), Some(12.3));
    assert_eq!(dm_from_name("obs_20m_ck01_DM0.00_ACCEL_10_JERK_30"), Some(0.0));
    assert_eq!(dm_from_name("DMobs_full_ck00_DM105.50_ACCEL_0"), Some(105.5));
    assert_eq!(dm_from_name("obs_full_ck00_ACCEL_0"), None);
}

#[test]
fn test_strip_uncertainty() {
    assert_eq!(strip_uncertainty("2.91447052(21)"), "2.91447052");
    assert_eq!(strip_uncertainty("-1.3(6.6)e-05"), "-1.3e-05");
    assert_eq!(strip_uncertainty("12.5"), "12.5");
}

// --- discovery ---

#[test]
fn test_accel_patterns() {
    assert_eq!(accel_patterns(&[0, 200], None), vec!["*_ACCEL_0", "*_ACCEL_200"]);
    assert_eq!(
        accel_patterns(&[0], Some((10, 30))),
        vec!["*_ACCEL_0", "*_ACCEL_10_JERK_30"]
    );
}

#[test]
fn test_discover_and_load_in_dm_order() {
    let dir = tempfile::tempdir().unwrap();
    for dm in ["20.00", "3.00", "100.00"] {
        let name = format!("obs_full_ck00_DM{dm}_ACCEL_0");
        std::fs::write(dir.path().join(&name), ACCEL_TEXT).unwrap();
        std::fs::write(dir.path().join(format!("{name}.cand")), "binary").unwrap();
        std::fs::write(dir.path().join(format!("{name}.txtcand")), "text").unwrap();
    }
    std::fs::write(dir.path().join("obs_full_ck00_DM3.00_ACCEL_0_empty"), "").unwrap();

    let files = discover_results(dir.path(), &accel_patterns(&[0], None));
    let dms: Vec<f64> = files.iter().map(|f| f.dm).collect();
    assert_eq!(dms, vec![3.0, 20.0, 100.0]);

    let cands = load_candidates(&files).unwrap();
    assert_eq!(cands.len(), 6);
    let ordinals: Vec<usize> = cands.iter().map(|c| c.ordinal).collect();
    assert_eq!(ordinals, (0..6).collect::<Vec<_>>());
    assert_eq!(cands[0].dm, 3.0);
    assert_eq!(cands[5].dm, 100.0);
}

#[test]
fn test_unreadable_result_file_aborts_loading() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![psrsieve::sift::ResultFile {
        path: dir.path().join("missing_DM1.00_ACCEL_0"),
        dm: 1.0,
    }];
    assert!(matches!(
        load_candidates(&files),
        Err(ParseError::Unreadable { .. })
    ));
}

// --- candidate list ---

#[test]
fn test_candlist_write_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sub").join("best_candidates.siftedcands");
    let cands = sift(mixed_set(), &policy());
    write_candlist(&path, &cands).unwrap();

    let back = read_candlist(&path).unwrap();
    assert_eq!(back.len(), cands.len());
    for (a, b) in cands.iter().zip(&back) {
        assert_eq!(a.id(), b.id());
        assert!((a.dm - b.dm).abs() < 0.01);
        assert!((a.sigma - b.sigma).abs() < 0.01);
        assert!((a.period_s - b.period_s).abs() < 1e-10);
    }
}

#[test]
fn test_candlist_header_is_named_columns() {
    let text = format_candlist(&[cand("f", 1.0, 2.0, 3.0, 0)]);
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("#file:candnum DM SNR sigma"));
    assert!(header.contains("P(ms)"));
}

#[test]
fn test_candlist_columns_found_by_name() {
    let text = "#P(ms) sigma DM file:candnum\n5.0 9.5 12.0 x_ACCEL_0:3\n";
    let cands = parse_candlist("list", text).unwrap();
    assert_eq!(cands.len(), 1);
    assert_eq!(cands[0].candnum, 3);
    assert_eq!(cands[0].file, "x_ACCEL_0");
    assert_eq!(cands[0].sigma, 9.5);
    assert!((cands[0].freq_hz - 200.0).abs() < 1e-9);
}

#[test]
fn test_candlist_bad_rows_skipped() {
    let text = "#file:candnum DM sigma P(ms)\nx:1 1.0 5.0 2.0\nnot a row\ny:2 2.0 4.0 -1\nz:3 3.0 3.0 4.0\n";
    let cands = parse_candlist("list", text).unwrap();
    let ids: Vec<String> = cands.iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["x:1", "z:3"]);
}

#[test]
fn test_candlist_requires_header_and_columns() {
    assert!(matches!(
        parse_candlist("list", "x:1 1.0 5.0 2.0\n"),
        Err(ParseError::MissingHeader(_))
    ));
    assert!(matches!(
        parse_candlist("list", "#file:candnum DM sigma\n"),
        Err(ParseError::MissingColumn { .. })
    ));
}
