use std::collections::HashSet;

use crate::auxiliary::index::unpack_pq;
use crate::connections::ConnectionBuilder;
use crate::coupling::ExcKind;
use crate::csf::Cfg;
use crate::wavefunction::WaveFunction;

fn wavefunction_of(spin: f64, occs: &[&str]) -> WaveFunction {
    let mut wfn = WaveFunction::new(spin);
    for occ in occs {
        let mut cfg = Cfg::from_occupation_str(spin, occ).unwrap();
        cfg.generate_all();
        wfn.insert_cfg(cfg);
    }
    wfn
}

#[test]
fn test_connections_two_orbital_singlet_space() {
    let wfn = wavefunction_of(0.0, &["20", "11", "02"]);
    let builder = ConnectionBuilder::new(2, 0);
    let connections = builder.build(&wfn);

    // ("20","11") and ("11","02") are single excitations.
    let one_el = connections
        .one_el
        .values()
        .flatten()
        .collect::<Vec<_>>();
    assert_eq!(one_el.len(), 2);
    for conn in &one_el {
        assert!(conn.icfg_left <= conn.icfg_right);
    }

    // ("20","02") is the double excitation at two orbitals.
    let two_el = connections
        .two_el
        .values()
        .flatten()
        .collect::<Vec<_>>();
    assert_eq!(two_el.len(), 1);
    assert!(!two_el[0].exchange);
    assert!(!two_el[0].phase);

    // Every configuration reaches the intermediate space and back: one route
    // each for the closed shells, two for the open shell.
    let n_dia = connections
        .diagonal
        .values()
        .map(Vec::len)
        .sum::<usize>();
    assert_eq!(n_dia, 4);
}

#[test]
fn test_connections_recorded_excitations_match_occupations() {
    let wfn = wavefunction_of(0.0, &["2200", "2110", "1120", "2101", "1111"]);
    let builder = ConnectionBuilder::new(4, 0);
    let connections = builder.build(&wfn);

    for (key, conns) in connections.one_el.iter() {
        for conn in conns {
            let (p, q) = unpack_pq(conn.pq, 4);
            let occ_left = wfn.cfg(conn.icfg_left).occupation();
            let occ_right = wfn.cfg(conn.icfg_right).occupation();
            // The bra occupations are the ket occupations with one electron
            // moved from q to p.
            let mut expected = occ_right.to_vec();
            expected[q] -= 1;
            expected[p] += 1;
            assert_eq!(occ_left, &expected[..]);

            let expected_kind = match (occ_right[p], occ_right[q]) {
                (1, 2) => ExcKind::DomoSomo,
                (0, 2) => ExcKind::DomoVirtual,
                (1, 1) => ExcKind::SomoSomo,
                (0, 1) => ExcKind::SomoVirtual,
                _ => unreachable!(),
            };
            assert_eq!(key.kind, expected_kind);
        }
    }
}

#[test]
fn test_connections_one_el_pairs_are_unique() {
    let wfn = wavefunction_of(0.0, &["2200", "2110", "1120", "2101", "1111", "2020"]);
    let builder = ConnectionBuilder::new(4, 0);
    let connections = builder.build(&wfn);

    let mut seen = HashSet::new();
    for conns in connections.one_el.values() {
        for conn in conns {
            assert!(
                seen.insert((conn.icfg_left, conn.icfg_right, conn.pq)),
                "Duplicate single-excitation connection."
            );
        }
    }
}

#[test]
fn test_connections_cross_space_is_unordered_and_diagonal_free() {
    let wfn_var = wavefunction_of(0.0, &["20"]);
    let wfn_fois = wavefunction_of(0.0, &["11", "02"]);
    let builder = ConnectionBuilder::new(2, 0);
    let connections = builder.build_cross(&wfn_fois, &wfn_var);

    assert!(connections.diagonal.is_empty());

    let one_el = connections.one_el.values().flatten().collect::<Vec<_>>();
    assert_eq!(one_el.len(), 1);
    assert_eq!(one_el[0].icfg_left, 0); // "11" in the candidate space
    assert_eq!(one_el[0].icfg_right, 0); // "20" in the variational space

    let two_el = connections.two_el.values().flatten().collect::<Vec<_>>();
    assert_eq!(two_el.len(), 1);
    assert_eq!(two_el[0].icfg_left, 1); // "02" in the candidate space
}

#[test]
fn test_connections_intermediate_spin_floor_is_enforced() {
    // For a triplet, intermediate configurations need at least two unpaired
    // electrons: the closed-shell route "11" -> "02" -> "11" is excluded.
    let wfn_singlet = wavefunction_of(0.0, &["11"]);
    let singlet_dia = ConnectionBuilder::new(2, 0)
        .build(&wfn_singlet)
        .diagonal
        .values()
        .map(Vec::len)
        .sum::<usize>();
    assert_eq!(singlet_dia, 2);

    let wfn_triplet = wavefunction_of(1.0, &["11"]);
    let triplet_dia = ConnectionBuilder::new(2, 2)
        .build(&wfn_triplet)
        .diagonal
        .values()
        .map(Vec::len)
        .sum::<usize>();
    assert_eq!(triplet_dia, 0);
}
