use psrsieve::known::{binary_doppler_fraction, load_catalog, match_known, parse_parfile};
use psrsieve::report::{CandidateClass, ClassifiedCandidate, classify, format_summary, write_summary};
use psrsieve::{Candidate, DmHit, KnownPulsar, ParseError, SearchUnit};

fn known(name: &str, period_s: f64) -> KnownPulsar {
    KnownPulsar {
        name: name.to_string(),
        period_s,
        doppler_fraction: 1e-4,
    }
}

fn cand(dm: f64, period_s: f64, sigma: f64) -> Candidate {
    Candidate {
        file: format!("obs_full_ck00_DM{dm:.2}_ACCEL_0"),
        candnum: 1,
        dm,
        snr: sigma,
        sigma,
        numharm: 2,
        ipow: 20.0,
        cpow: 15.0,
        period_s,
        freq_hz: 1.0 / period_s,
        r: 0.0,
        z: 0.0,
        hits: vec![DmHit {
            dm,
            snr: sigma,
            sigma,
        }],
        ordinal: 0,
    }
}

// --- matching ---

#[test]
fn test_half_period_is_second_harmonic() {
    let catalog = vec![known("J0000+0000", 0.003)];
    let m = match_known(0.0015, &catalog, 16).unwrap();
    assert_eq!(m.name, "J0000+0000");
    assert_eq!(m.numerator, 1);
    assert_eq!(m.harmonic, 2);
    assert!(!m.is_fundamental());
    assert!(m.explanation.contains("1/2 harmonic"));
}

#[test]
fn test_fundamental_match_inside_window() {
    let catalog = vec![known("A", 0.5)];
    let m = match_known(0.5 * (1.0 + 0.5e-4), &catalog, 8).unwrap();
    assert!(m.is_fundamental());
    assert!(m.explanation.starts_with("fundamental"));
}

#[test]
fn test_fundamental_match_is_symmetric() {
    // The same known period in the catalog matches a candidate at that period.
    let periods = [0.00157, 0.0893, 0.714, 1.2923];
    let catalog: Vec<KnownPulsar> = periods
        .iter()
        .enumerate()
        .map(|(i, p)| known(&format!("P{i}"), *p))
        .collect();
    for (i, p) in periods.iter().enumerate() {
        let m = match_known(*p, &catalog, 16).unwrap();
        assert_eq!(m.name, format!("P{i}"));
        assert!(m.is_fundamental());
    }
}

#[test]
fn test_direct_hit_wins_over_earlier_harmonic() {
    // 0.002 is 2/1 of A, but a direct hit on B is preferred.
    let catalog = vec![known("A", 0.001), known("B", 0.002)];
    let m = match_known(0.002, &catalog, 16).unwrap();
    assert_eq!(m.name, "B");
    assert!(m.is_fundamental());
}

#[test]
fn test_rational_harmonic() {
    let catalog = vec![known("A", 0.009)];
    // 0.006 = 0.009 × 2/3
    let m = match_known(0.006, &catalog, 16).unwrap();
    assert_eq!((m.numerator, m.harmonic), (2, 3));
}

#[test]
fn test_no_match() {
    let catalog = vec![known("A", 0.0031)];
    assert!(match_known(0.0047123, &catalog, 1).is_none());
    assert!(match_known(0.0047123, &[], 16).is_none());
}

#[test]
fn test_harmonic_limit_is_respected() {
    let catalog = vec![known("A", 0.010)];
    assert!(match_known(0.010 / 3.0, &catalog, 2).is_none());
    let m = match_known(0.010 / 3.0, &catalog, 3).unwrap();
    assert_eq!((m.numerator, m.harmonic), (1, 3));
}

// --- par files ---

#[test]
fn test_parse_isolated_parfile() {
    let text = "PSRJ           J0437-4715\nF0             173.6879458121843  1  0.0000000000000\nDM             2.64\n";
    let p = parse_parfile("a.par", text).unwrap();
    assert_eq!(p.name, "J0437-4715");
    assert!((p.period_s - 1.0 / 173.6879458121843).abs() < 1e-15);
    assert_eq!(p.doppler_fraction, 1e-4);
}

#[test]
fn test_parse_binary_parfile_with_fortran_exponents() {
    let text = "PSR B1913+16\nP0 0.059030D0\nBINARY BT\nPB 0.322997\nA1 2.3418\n";
    let p = parse_parfile("b.par", text).unwrap();
    assert_eq!(p.name, "B1913+16");
    assert!((p.period_s - 0.05903).abs() < 1e-12);
    let expected = binary_doppler_fraction(2.3418, 0.322997 * 86_400.0);
    assert!((p.doppler_fraction - expected).abs() < 1e-15);
    assert!(p.doppler_fraction > 1e-4);
}

#[test]
fn test_binary_doppler_fraction() {
    // 2π · 1 lt-s / 86400 s
    let d = binary_doppler_fraction(1.0, 86_400.0);
    assert!((d - 2.0 * std::f64::consts::PI / 86_400.0).abs() < 1e-15);
}

#[test]
fn test_parfile_missing_keys() {
    assert!(matches!(
        parse_parfile("x.par", "F0 10.0\n"),
        Err(ParseError::MissingKey { ref key, .. }) if key == "PSR"
    ));
    assert!(matches!(
        parse_parfile("x.par", "PSRJ J1\nDM 3\n"),
        Err(ParseError::MissingKey { ref key, .. }) if key == "F0"
    ));
    assert!(matches!(
        parse_parfile("x.par", "PSRJ J1\nF0 10\nBINARY ELL1\nPB 1.0\n"),
        Err(ParseError::MissingKey { ref key, .. }) if key == "A1"
    ));
}

#[test]
fn test_load_catalog_skips_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.par"), "PSRJ J2\nF0 2.0\n").unwrap();
    std::fs::write(dir.path().join("a.par"), "PSRJ J1\nF0 1.0\n").unwrap();
    std::fs::write(dir.path().join("broken.par"), "nothing useful\n").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "PSRJ J3\nF0 3.0\n").unwrap();

    let catalog = load_catalog(dir.path());
    let names: Vec<&str> = catalog.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["J1", "J2"]);
}

#[test]
fn test_missing_catalog_dir_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_catalog(&dir.path().join("none")).is_empty());
}

// --- classification and summary ---

#[test]
fn test_classify() {
    let catalog = vec![known("J1", 0.003)];
    assert_eq!(classify(&cand(1.0, 0.05, 9.0), &catalog, 16, 2.0), CandidateClass::LikelyRfi);
    assert!(matches!(
        classify(&cand(20.0, 0.0015, 9.0), &catalog, 16, 2.0),
        CandidateClass::Known(_)
    ));
    assert!(classify(&cand(20.0, 0.0471, 9.0), &catalog, 1, 2.0).is_new());
}

#[test]
fn test_summary_lists_candidates_by_period() {
    let catalog = vec![known("J1", 0.003)];
    let unit = SearchUnit::new("full", "ck00");
    let classified: Vec<ClassifiedCandidate> = [
        cand(20.0, 0.25, 8.0),
        cand(20.0, 0.0015, 9.0),
        cand(0.5, 0.1, 7.0),
    ]
    .into_iter()
    .map(|c| ClassifiedCandidate {
        unit: unit.clone(),
        class: classify(&c, &catalog, 16, 2.0),
        candidate: c,
    })
    .collect();

    let text = format_summary("obs", &[(unit.clone(), classified.clone())]);
    assert!(text.starts_with("# Candidates of obs"));
    assert!(text.contains("3 candidates"));

    let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].contains("Likely J1"));
    assert!(rows[1].contains("Likely RFI"));
    assert!(rows[2].trim_start().starts_with("250.00000000"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("04_SIFTING").join("obs_cands.summary");
    write_summary(&path, "obs", &[(unit, classified)]).unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), text);
}
