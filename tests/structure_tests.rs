use psrsieve::structure::{
    FULL_LABEL, Remainder, build_structure, chunk_label, classify_remainder, search_units,
    segment_label, split_segment,
};

// --- remainder classification ---

#[test]
fn test_classify_remainder_thresholds() {
    assert_eq!(classify_remainder(0.0), Remainder::None);
    assert_eq!(classify_remainder(0.05), Remainder::DroppedQuiet(0.05));
    assert_eq!(classify_remainder(0.10), Remainder::DroppedQuiet(0.10));
    assert_eq!(classify_remainder(0.5), Remainder::DroppedWarn(0.5));
    assert_eq!(classify_remainder(0.80), Remainder::Kept(0.80));
    assert_eq!(classify_remainder(0.95), Remainder::Kept(0.95));
}

// --- labels ---

#[test]
fn test_labels() {
    assert_eq!(segment_label(20.0), "20m");
    assert_eq!(segment_label(5.0), "5m");
    assert_eq!(chunk_label(0), "ck00");
    assert_eq!(chunk_label(12), "ck12");
}

#[test]
fn test_fractional_segment_labels() {
    assert_eq!(segment_label(7.5), "7.5m");
    assert_eq!(segment_label(0.5), "0.5m");
    assert_eq!(segment_label(7.0), "7m");
}

#[test]
fn test_fractional_and_whole_segments_are_kept_apart() {
    let segs = build_structure(3600.0, true, &[7.5, 7.0, 0.5]);
    let labels: Vec<&str> = segs.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["full", "7.5m", "7m", "0.5m"]);
    let lengths: Vec<Option<f64>> = segs.iter().map(|s| s.length_s).collect();
    assert_eq!(lengths, vec![None, Some(450.0), Some(420.0), Some(30.0)]);
    assert_eq!(segs[3].chunks.len(), 120);
}

// --- split_segment ---

#[test]
fn test_exact_division_gives_whole_chunks() {
    let chunks = split_segment(3600.0, 1200.0).unwrap();
    assert_eq!(chunks.len(), 3);
    let starts: Vec<f64> = chunks.iter().map(|c| c.start_s).collect();
    assert_eq!(starts, vec![0.0, 1200.0, 2400.0]);
    assert!(chunks.iter().all(|c| c.length_s == 1200.0));
    assert_eq!(chunks[2].label, "ck02");
}

#[test]
fn test_segment_longer_than_observation_is_dropped() {
    assert!(split_segment(1000.0, 1200.0).is_none());
}

#[test]
fn test_segment_near_full_length_is_redundant() {
    assert!(split_segment(1000.0, 800.0).is_none());
    assert!(split_segment(1000.0, 790.0).is_some());
}

#[test]
fn test_near_full_trailing_piece_is_kept_short() {
    // 3500 / 1000 = 3.5 → dropped; 3850 / 1000 = 3.85 → kept as a fourth, shorter chunk.
    assert_eq!(split_segment(3500.0, 1000.0).unwrap().len(), 3);
    let chunks = split_segment(3850.0, 1000.0).unwrap();
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[3].start_s, 3000.0);
    assert!((chunks[3].length_s - 850.0).abs() < 1e-9);
}

#[test]
fn test_chunks_are_contiguous_and_inside_the_observation() {
    for duration in [600.0, 1234.5, 3600.0, 7777.0] {
        for length in [60.0, 100.0, 300.0, 450.0] {
            let Some(chunks) = split_segment(duration, length) else {
                continue;
            };
            assert_eq!(chunks[0].start_s, 0.0);
            for pair in chunks.windows(2) {
                assert!((pair[0].start_s + pair[0].length_s - pair[1].start_s).abs() < 1e-9);
            }
            let last = chunks.last().unwrap();
            let end = last.start_s + last.length_s;
            assert!(end <= duration + 1e-9);
            // At most one partial chunk is missing at the end.
            assert!(duration - end < length);
        }
    }
}

// --- build_structure ---

#[test]
fn test_full_only() {
    let segs = build_structure(3600.0, true, &[]);
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].label, FULL_LABEL);
    assert!(segs[0].is_full());
    assert_eq!(segs[0].chunks.len(), 1);
    assert_eq!(segs[0].chunks[0].length_s, 3600.0);
}

#[test]
fn test_full_plus_segments() {
    let segs = build_structure(3600.0, true, &[20.0, 10.0]);
    let labels: Vec<&str> = segs.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["full", "20m", "10m"]);
    assert_eq!(segs[1].chunks.len(), 3);
    assert_eq!(segs[2].chunks.len(), 6);
    assert_eq!(segs[1].length_s, Some(1200.0));
}

#[test]
fn test_oversized_segment_is_skipped() {
    let segs = build_structure(1000.0, true, &[20.0]);
    assert_eq!(segs.len(), 1);
    assert!(segs[0].is_full());
}

#[test]
fn test_repeated_segment_is_ignored() {
    let segs = build_structure(3600.0, false, &[10.0, 10.0]);
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].label, "10m");
}

#[test]
fn test_structure_is_deterministic() {
    let a = build_structure(5432.1, true, &[5.0, 15.0, 30.0]);
    let b = build_structure(5432.1, true, &[5.0, 15.0, 30.0]);
    assert_eq!(a, b);
}

// --- search_units ---

#[test]
fn test_search_units_in_order() {
    let segs = build_structure(3600.0, true, &[20.0]);
    let units = search_units(&segs);
    let tags: Vec<String> = units.iter().map(|u| u.tag()).collect();
    assert_eq!(
        tags,
        vec!["full_ck00", "20m_ck00", "20m_ck01", "20m_ck02"]
    );
}
