use approx::assert_relative_eq;
use ndarray::{Array1, Array2, Array4};
use ndarray_linalg::{Eigh, UPLO};

use crate::auxiliary::system::ElectronicSystem;
use crate::connections::ConnectionBuilder;
use crate::coupling::CouplingCoeffs;
use crate::csf::{Cfg, SpinFunctionTable};
use crate::hamiltonian::SigmaEvaluator;
use crate::parallel::SingleProcess;
use crate::selection::select_and_grow;
use crate::wavefunction::WaveFunction;

fn test_system() -> ElectronicSystem {
    let n = 3;
    let mut h = Array2::zeros((n, n));
    h[(0, 0)] = -2.0;
    h[(1, 1)] = -1.0;
    h[(2, 2)] = -0.4;
    h[(0, 1)] = 0.1;
    h[(1, 0)] = 0.1;
    h[(1, 2)] = 0.05;
    h[(2, 1)] = 0.05;
    let v = ndarray::array![
        [0.60, 0.10, 0.05],
        [0.10, 0.55, 0.08],
        [0.05, 0.08, 0.50]
    ];
    let mut g = Array4::zeros((n, n, n, n));
    for p in 0..n {
        for q in 0..n {
            for r in 0..n {
                for s in 0..n {
                    g[(p, q, r, s)] = v[(p, q)] * v[(r, s)];
                }
            }
        }
    }
    ElectronicSystem::new(n, 2, 1, h, g, 0.0).unwrap()
}

/// Solves the current wavefunction exactly through the dense Hamiltonian.
fn ground_state(
    system: &ElectronicSystem,
    wfn: &WaveFunction,
    table: &SpinFunctionTable,
) -> (f64, Array1<f64>) {
    let builder = ConnectionBuilder::new(system.n_orbitals(), system.min_unpaired());
    let connections = builder.build(wfn);
    let mut coupling = CouplingCoeffs::new();
    coupling.construct(table, &connections, wfn, wfn);
    let evaluator = SigmaEvaluator::new(system, wfn, &connections, &coupling, &SingleProcess);
    let (values, vectors) = evaluator.dense_matrix().eigh(UPLO::Lower).unwrap();
    (values[0], vectors.column(0).to_owned())
}

fn hartree_fock_seed(system: &ElectronicSystem, table: &mut SpinFunctionTable) -> WaveFunction {
    table.create_all(system.spin(), system.min_unpaired());
    let mut cfg = Cfg::from_occupation_str(system.spin(), "200").unwrap();
    cfg.generate_all();
    cfg.assign_sf_indices(table);
    let mut wfn = WaveFunction::new(system.spin());
    wfn.insert_cfg(cfg);
    wfn
}

#[test]
fn test_selection_grows_the_variational_space() {
    let system = test_system();
    let mut table = SpinFunctionTable::new();
    let mut wfn = hartree_fock_seed(&system, &mut table);
    let (energy, ci) = ground_state(&system, &wfn, &table);
    assert_relative_eq!(ci[0].abs(), 1.0, max_relative = 1e-12);

    let mut coupling = CouplingCoeffs::new();
    let outcome = select_and_grow(
        &system,
        1e-2,
        1e-12,
        &mut wfn,
        &mut table,
        &mut coupling,
        &[energy],
        &[ci],
    );

    assert_eq!(outcome.n_generators, 1);
    assert!(outcome.n_candidates > 0);
    assert!(outcome.n_new_cfgs > 0);
    assert_eq!(wfn.n_cfgs(), 1 + outcome.n_new_cfgs);

    // A two-electron system reaches its full CI space within one double
    // excitation of the closed-shell seed: all six singlet configurations.
    assert_eq!(wfn.n_cfgs(), 6);

    // Block offsets stay contiguous across the merge.
    let mut expected = 0;
    for icfg in 0..wfn.n_cfgs() {
        assert_eq!(wfn.offset(icfg), expected);
        expected += wfn.block_len(icfg);
    }
}

#[test]
fn test_selection_is_idempotent_at_fixed_threshold() {
    let system = test_system();
    let mut table = SpinFunctionTable::new();
    let mut wfn = hartree_fock_seed(&system, &mut table);
    let (energy, ci) = ground_state(&system, &wfn, &table);

    let mut coupling = CouplingCoeffs::new();
    select_and_grow(
        &system,
        1e-2,
        1e-12,
        &mut wfn,
        &mut table,
        &mut coupling,
        &[energy],
        &[ci],
    );
    let n_cfgs = wfn.n_cfgs();
    let n_csfs = wfn.n_csfs();

    // With the same generator set, a second pass finds every candidate already
    // admitted.
    let mut ci = Array1::zeros(wfn.n_csfs());
    ci[0] = 1.0;
    coupling.invalidate();
    let outcome = select_and_grow(
        &system,
        1e-2,
        1e-12,
        &mut wfn,
        &mut table,
        &mut coupling,
        &[energy],
        &[ci],
    );

    assert_eq!(outcome.n_generators, 1);
    assert_eq!(outcome.n_candidates, 0);
    assert_eq!(outcome.n_new_cfgs, 0);
    assert_eq!(outcome.n_new_csfs, 0);
    assert_eq!(wfn.n_cfgs(), n_cfgs);
    assert_eq!(wfn.n_csfs(), n_csfs);
}

#[test]
fn test_selection_threshold_prunes_everything() {
    let system = test_system();
    let mut table = SpinFunctionTable::new();
    let mut wfn = hartree_fock_seed(&system, &mut table);
    let (energy, ci) = ground_state(&system, &wfn, &table);

    let mut coupling = CouplingCoeffs::new();
    let outcome = select_and_grow(
        &system,
        1e-2,
        1e9,
        &mut wfn,
        &mut table,
        &mut coupling,
        &[energy],
        &[ci],
    );

    assert!(outcome.n_candidates > 0);
    assert_eq!(outcome.n_new_cfgs, 0);
    assert_eq!(wfn.n_cfgs(), 1);
}
