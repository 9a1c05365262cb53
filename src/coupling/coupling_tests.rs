use approx::assert_relative_eq;

use crate::coupling::{cc_info, compute_1el_block, diagonal_exchange, CcKey1, ExcKind};
use crate::csf::{Cfg, SpinFunctionTable};

fn singlet_table() -> SpinFunctionTable {
    let mut table = SpinFunctionTable::new();
    table.create_all(0.0, 4);
    table
}

#[test]
fn test_coupling_cc_info_classification() {
    // E_{01} taking the singlet open-shell pair to the closed shell.
    let key = cc_info(0, 1, 0, 2, &[2, 0], &[1, 1]);
    assert_eq!(key.kind, ExcKind::SomoSomo);
    assert_eq!((key.prel, key.qrel), (0, 1));

    // Its adjoint E_{10} acting on the closed shell.
    let key = cc_info(1, 0, 2, 0, &[1, 1], &[2, 0]);
    assert_eq!(key.kind, ExcKind::DomoVirtual);
    assert_eq!((key.prel, key.qrel), (1, 0));

    // Annihilation on a doubly-occupied orbital, creation on a singly-occupied one.
    let key = cc_info(0, 2, 2, 2, &[2, 1, 1, 0], &[1, 1, 2, 0]);
    assert_eq!(key.kind, ExcKind::DomoSomo);
    assert_eq!((key.prel, key.qrel), (0, 2));

    // Creation on an empty orbital.
    let key = cc_info(2, 0, 2, 2, &[0, 1, 1, 0], &[1, 1, 0, 0]);
    assert_eq!(key.kind, ExcKind::SomoVirtual);
    assert_eq!((key.prel, key.qrel), (2, 0));
}

#[test]
fn test_coupling_singlet_pair_block_value() {
    let table = singlet_table();

    // <20|E_{01}|singlet(11)> = sqrt(2).
    let key_ss = CcKey1 {
        kind: ExcKind::SomoSomo,
        nue_left: 0,
        nue_right: 2,
        prel: 0,
        qrel: 1,
    };
    let block_ss = compute_1el_block(&table, &key_ss, &[0], &[0]);
    assert_relative_eq!(block_ss[&(0, 0)], 2.0_f64.sqrt(), max_relative = 1e-12);

    // The adjoint excitation yields the transposed (here identical) value.
    let key_dv = CcKey1 {
        kind: ExcKind::DomoVirtual,
        nue_left: 2,
        nue_right: 0,
        prel: 1,
        qrel: 0,
    };
    let block_dv = compute_1el_block(&table, &key_dv, &[0], &[0]);
    assert_relative_eq!(
        block_dv[&(0, 0)].abs(),
        block_ss[&(0, 0)].abs(),
        max_relative = 1e-12
    );
}

#[test]
fn test_coupling_adjoint_blocks_are_transposes() {
    let table = singlet_table();

    // E_{01} between |1111> (two singlet couplings) and |2011> (one).
    let key = CcKey1 {
        kind: ExcKind::SomoSomo,
        nue_left: 2,
        nue_right: 4,
        prel: 0,
        qrel: 1,
    };
    let block = compute_1el_block(&table, &key, &[0], &[0, 1]);

    let key_adj = CcKey1 {
        kind: ExcKind::DomoVirtual,
        nue_left: 4,
        nue_right: 2,
        prel: 1,
        qrel: 0,
    };
    let block_adj = compute_1el_block(&table, &key_adj, &[0, 1], &[0]);

    let mut nonzero = 0;
    for i in 0..2 {
        assert_relative_eq!(
            block[&(0, i)].abs(),
            block_adj[&(i, 0)].abs(),
            epsilon = 1e-12
        );
        if block[&(0, i)].abs() > 1e-12 {
            nonzero += 1;
        }
    }
    assert!(nonzero > 0);
}

#[test]
fn test_coupling_diagonal_exchange_open_shell_pair() {
    // Singlet coupling of two unpaired electrons: the exchange term
    // -(1/2) (pq|qp) (n_p n_q + ccx) must come out as +(pq|qp).
    let mut cfg = Cfg::from_occupation_str(0.0, "11").unwrap();
    cfg.generate_all();
    let ccx = diagonal_exchange(0, 1, &cfg);
    assert_eq!(ccx.len(), 1);
    assert_relative_eq!(ccx[0], -3.0, max_relative = 1e-12);

    // Triplet coupling: the same term must come out as -(pq|qp).
    let mut cfg = Cfg::from_occupation_str(1.0, "11").unwrap();
    cfg.generate_all();
    let ccx = diagonal_exchange(0, 1, &cfg);
    assert_eq!(ccx.len(), 1);
    assert_relative_eq!(ccx[0], 1.0, max_relative = 1e-12);
}

#[test]
fn test_coupling_closed_shell_has_no_exchange_term() {
    let mut cfg = Cfg::from_occupation_str(0.0, "22").unwrap();
    cfg.generate_all();
    let ccx = diagonal_exchange(0, 1, &cfg);
    assert_eq!(ccx, vec![0.0]);
}
