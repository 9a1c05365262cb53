use std::collections::BTreeMap;

use crate::csf::{
    occupation_of_step_vector, parse_occupation_vector, parse_step_vector, spin_function_of,
    step_vector_string, Cfg, SpinFunctionTable,
};

/// Number of valid spin couplings of `nue` unpaired electrons to total spin `s`,
/// from the closed-form ballot count.
fn spin_coupling_count(nue: usize, s: f64) -> usize {
    let k = ((nue as f64) / 2.0 - s).round() as i64;
    if k < 0 {
        return 0;
    }
    let binom = |n: i64, k: i64| -> i64 {
        if k < 0 || k > n {
            0
        } else {
            (1..=k).fold(1i64, |acc, i| acc * (n - i + 1) / i)
        }
    };
    (binom(nue as i64, k) - binom(nue as i64, k - 1)) as usize
}

#[test]
fn test_csf_closed_shell_single_csf() {
    let mut cfg = Cfg::from_occupation_str(0.0, "2020").unwrap();
    cfg.generate_all();
    assert_eq!(cfg.n_csfs(), 1);
    assert_eq!(cfg.csf(0), &[3, 0, 3, 0]);

    // A closed shell cannot couple to a triplet.
    let mut cfg = Cfg::from_occupation_str(1.0, "2020").unwrap();
    cfg.generate_all();
    assert_eq!(cfg.n_csfs(), 0);
}

#[test]
fn test_csf_generation_counts_match_closed_form() {
    for nue in [2usize, 4, 6, 8] {
        for s in [0.0, 1.0, 2.0] {
            let occ = vec![1u8; nue];
            let mut cfg = Cfg::new(s, occ);
            cfg.generate_all();
            assert_eq!(
                cfg.n_csfs(),
                spin_coupling_count(nue, s),
                "nue = {nue}, S = {s}"
            );
        }
    }
    for nue in [1usize, 3, 5, 7] {
        for s in [0.5, 1.5] {
            let occ = vec![1u8; nue];
            let mut cfg = Cfg::new(s, occ);
            cfg.generate_all();
            assert_eq!(
                cfg.n_csfs(),
                spin_coupling_count(nue, s),
                "nue = {nue}, S = {s}"
            );
        }
    }
}

#[test]
fn test_csf_position_round_trip() {
    let mut cfg = Cfg::from_occupation_str(0.5, "211012").unwrap();
    cfg.generate_all();
    assert!(cfg.n_csfs() > 1);
    for icsf in 0..cfg.n_csfs() {
        let csf = cfg.csf(icsf).to_vec();
        assert_eq!(cfg.position_of(&csf), Some(icsf));
    }
    assert_eq!(cfg.position_of(&[0, 0, 0, 0, 0, 0]), None);
}

#[test]
fn test_csf_two_orbitals_two_electrons_singlet() {
    for (occ, expected) in [("20", vec![vec![3u8, 0]]), ("02", vec![vec![0u8, 3]]), ("11", vec![vec![1u8, 2]])] {
        let mut cfg = Cfg::from_occupation_str(0.0, occ).unwrap();
        cfg.generate_all();
        assert_eq!(cfg.csfs(), &expected, "occ = {occ}");
    }
}

#[test]
fn test_csf_extract_spin_functions() {
    let mut cfg = Cfg::from_occupation_str(0.0, "1212").unwrap();
    cfg.generate_all();
    assert_eq!(cfg.extract_sfs(), vec!["+-".to_string()]);

    let mut cfg = Cfg::from_occupation_str(0.0, "22").unwrap();
    cfg.generate_all();
    assert_eq!(cfg.extract_sfs(), vec![String::new()]);
}

#[test]
fn test_csf_malformed_digits_rejected() {
    assert!(parse_step_vector("0124").is_err());
    assert!(parse_step_vector("12x0").is_err());
    assert!(parse_occupation_vector("031").is_err());
    assert!(parse_occupation_vector("2120").is_ok());
}

#[test]
fn test_csf_step_vector_conversions() {
    let csf = parse_step_vector("1230").unwrap();
    assert_eq!(step_vector_string(&csf), "1230");
    assert_eq!(occupation_of_step_vector(&csf), vec![1, 1, 2, 0]);
    assert_eq!(spin_function_of(&csf), "+-");
}

#[test]
fn test_csf_from_spin_functions() {
    let mut cfg = Cfg::from_occupation_str(0.0, "1122").unwrap();
    let mut sfs = BTreeMap::new();
    sfs.insert("+-".to_string(), 7usize);
    cfg.csfs_from_sfs(&sfs);
    assert_eq!(cfg.n_csfs(), 1);
    assert_eq!(cfg.csf(0), &[1, 2, 3, 3]);
    assert_eq!(cfg.sf_idxs(), &[7]);
    assert_eq!(cfg.position_of(&[1, 2, 3, 3]), Some(0));
}

#[test]
fn test_spin_function_table_enumeration() {
    let mut table = SpinFunctionTable::new();
    table.create_all(0.0, 4);
    assert_eq!(table.len(0), 1);
    assert_eq!(table.sf(0, 0), Some(""));
    assert_eq!(table.len(2), 1);
    assert_eq!(table.sf(2, 0), Some("+-"));
    assert_eq!(table.len(4), 2);
    assert_eq!(table.sf(4, 0), Some("++--"));
    assert_eq!(table.sf(4, 1), Some("+-+-"));

    let mut table = SpinFunctionTable::new();
    table.create_all(0.5, 3);
    assert_eq!(table.len(1), 1);
    assert_eq!(table.len(3), 2);
    assert_eq!(table.index_of(3, "++-"), Some(0));
    assert_eq!(table.index_of(3, "+-+"), Some(1));
}

#[test]
fn test_spin_function_table_append_keeps_indices() {
    let mut table = SpinFunctionTable::new();
    table.create_all(0.0, 2);
    let idx = table.index_of(2, "+-").unwrap();
    assert_eq!(table.insert(2, "+-".to_string()), idx);
    let fresh = table.insert(4, "+-+-".to_string());
    assert_eq!(fresh, 0);
    assert_eq!(table.insert(4, "++--".to_string()), 1);
    assert_eq!(table.sf(4, 0), Some("+-+-"));
}
