use approx::assert_relative_eq;
use ndarray::{Array1, Array2, Array4};
use ndarray_linalg::{Eigh, UPLO};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::auxiliary::system::ElectronicSystem;
use crate::connections::{ConnectionBuilder, ConnectionSet};
use crate::coupling::CouplingCoeffs;
use crate::csf::{Cfg, SpinFunctionTable};
use crate::davidson::{self, DavidsonParams};
use crate::hamiltonian::SigmaEvaluator;
use crate::parallel::SingleProcess;
use crate::wavefunction::WaveFunction;

/// Enumerates every configuration of `n_electrons` in `n_orbitals` compatible
/// with the system's spin and assembles the full-CI wavefunction.
fn full_ci_wavefunction(system: &ElectronicSystem) -> (WaveFunction, SpinFunctionTable) {
    let mut table = SpinFunctionTable::new();
    table.create_all(system.spin(), system.n_electrons());

    let mut occs = Vec::new();
    let mut occ = vec![0u8; system.n_orbitals()];
    enumerate_occs(system.n_electrons(), 0, &mut occ, &mut occs);

    let mut wfn = WaveFunction::new(system.spin());
    for occ in occs {
        if occ.iter().filter(|&&d| d == 1).count() < system.min_unpaired() {
            continue;
        }
        let mut cfg = Cfg::new(system.spin(), occ);
        cfg.generate_all();
        if cfg.n_csfs() == 0 {
            continue;
        }
        cfg.assign_sf_indices(&mut table);
        wfn.insert_cfg(cfg);
    }
    (wfn, table)
}

fn enumerate_occs(remaining: usize, i: usize, occ: &mut Vec<u8>, out: &mut Vec<Vec<u8>>) {
    if remaining == 0 {
        out.push(occ.clone());
        return;
    }
    if i == occ.len() {
        return;
    }
    for d in (0..=remaining.min(2) as u8).rev() {
        occ[i] = d;
        enumerate_occs(remaining - usize::from(d), i + 1, occ, out);
    }
    occ[i] = 0;
}

fn connect(
    system: &ElectronicSystem,
    wfn: &WaveFunction,
    table: &SpinFunctionTable,
) -> (ConnectionSet, CouplingCoeffs) {
    let builder = ConnectionBuilder::new(system.n_orbitals(), system.min_unpaired());
    let connections = builder.build(wfn);
    let mut coupling = CouplingCoeffs::new();
    coupling.construct(table, &connections, wfn, wfn);
    (connections, coupling)
}

/// A small system with symmetric random-ish integrals.
fn random_system(n_orbitals: usize, n_electrons: usize, multiplicity: usize, seed: u64) -> ElectronicSystem {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut h = Array2::zeros((n_orbitals, n_orbitals));
    for p in 0..n_orbitals {
        h[(p, p)] = -2.0 + 0.4 * p as f64;
        for q in 0..p {
            let val = 0.1 * rng.gen_range(-1.0..1.0);
            h[(p, q)] = val;
            h[(q, p)] = val;
        }
    }
    let mut v = Array2::zeros((n_orbitals, n_orbitals));
    for p in 0..n_orbitals {
        for q in 0..=p {
            let val = if p == q {
                0.5 + 0.1 * rng.gen_range(0.0..1.0)
            } else {
                0.05 * rng.gen_range(-1.0..1.0)
            };
            v[(p, q)] = val;
            v[(q, p)] = val;
        }
    }
    let mut g = Array4::zeros((n_orbitals, n_orbitals, n_orbitals, n_orbitals));
    for p in 0..n_orbitals {
        for q in 0..n_orbitals {
            for r in 0..n_orbitals {
                for s in 0..n_orbitals {
                    g[(p, q, r, s)] = v[(p, q)] * v[(r, s)];
                }
            }
        }
    }
    ElectronicSystem::new(n_orbitals, n_electrons, multiplicity, h, g, 0.0).unwrap()
}

#[test]
fn test_hamiltonian_two_orbital_singlet_scenario() {
    // Two orbitals, two electrons, singlet, zero off-diagonal integrals: the
    // three configurations "02", "11" and "20" carry one singlet CSF each and
    // the ground state is the lowest diagonal value.
    let mut h = Array2::zeros((2, 2));
    h[(0, 0)] = -1.0;
    h[(1, 1)] = -0.5;
    let g = Array4::zeros((2, 2, 2, 2));
    let system = ElectronicSystem::new(2, 2, 1, h, g, 0.0).unwrap();

    let (wfn, table) = full_ci_wavefunction(&system);
    assert_eq!(wfn.n_cfgs(), 3);
    assert_eq!(wfn.n_csfs(), 3);
    for icfg in 0..3 {
        assert_eq!(wfn.block_len(icfg), 1);
    }

    let (connections, coupling) = connect(&system, &wfn, &table);
    let evaluator = SigmaEvaluator::new(&system, &wfn, &connections, &coupling, &SingleProcess);

    let diag = evaluator.diagonal();
    let lowest = diag.iter().cloned().fold(f64::INFINITY, f64::min);
    assert_relative_eq!(lowest, -2.0, max_relative = 1e-12);

    let result = davidson::diagonalize(
        1,
        &DavidsonParams::default(),
        || evaluator.diagonal(),
        |diag| {
            let at = diag
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                .map(|(i, _)| i)
                .unwrap();
            let mut v = Array1::zeros(diag.len());
            v[at] = 1.0;
            Ok(vec![v])
        },
        |trial| evaluator.sigma(trial.view()),
    )
    .unwrap();
    assert!(result.converged);
    assert_relative_eq!(result.eigenvalues[0], -2.0, max_relative = 1e-10);
}

#[test]
fn test_hamiltonian_sigma_is_linear() {
    let system = random_system(4, 4, 1, 7);
    let (wfn, table) = full_ci_wavefunction(&system);
    let (connections, coupling) = connect(&system, &wfn, &table);
    let evaluator = SigmaEvaluator::new(&system, &wfn, &connections, &coupling, &SingleProcess);

    let n = wfn.n_csfs();
    let mut rng = StdRng::seed_from_u64(11);
    let x: Array1<f64> = Array1::from_iter((0..n).map(|_| rng.gen_range(-1.0..1.0)));
    let y: Array1<f64> = Array1::from_iter((0..n).map(|_| rng.gen_range(-1.0..1.0)));
    let (a, b) = (0.7, -1.3);

    let combined = evaluator.sigma((a * &x + b * &y).view());
    let separate = a * evaluator.sigma(x.view()) + b * evaluator.sigma(y.view());
    for i in 0..n {
        assert_relative_eq!(combined[i], separate[i], epsilon = 1e-10);
    }
}

#[test]
fn test_hamiltonian_is_symmetric() {
    let system = random_system(4, 4, 1, 23);
    let (wfn, table) = full_ci_wavefunction(&system);
    let (connections, coupling) = connect(&system, &wfn, &table);
    let evaluator = SigmaEvaluator::new(&system, &wfn, &connections, &coupling, &SingleProcess);

    let n = wfn.n_csfs();
    let mut rng = StdRng::seed_from_u64(29);
    for _ in 0..3 {
        let u = Array1::from_iter((0..n).map(|_| rng.gen_range(-1.0..1.0)));
        let v = Array1::from_iter((0..n).map(|_| rng.gen_range(-1.0..1.0)));
        let lhs = u.dot(&evaluator.sigma(v.view()));
        let rhs = v.dot(&evaluator.sigma(u.view()));
        assert_relative_eq!(lhs, rhs, epsilon = 1e-10);
    }
}

#[test]
fn test_hamiltonian_sigma_matches_dense_matrix() {
    let system = random_system(3, 3, 2, 41);
    let (wfn, table) = full_ci_wavefunction(&system);
    let (connections, coupling) = connect(&system, &wfn, &table);
    let evaluator = SigmaEvaluator::new(&system, &wfn, &connections, &coupling, &SingleProcess);

    let n = wfn.n_csfs();
    let dense = evaluator.dense_matrix();
    for j in 0..n {
        let mut unit = Array1::zeros(n);
        unit[j] = 1.0;
        let column = evaluator.sigma(unit.view());
        for i in 0..n {
            assert_relative_eq!(column[i], dense[(i, j)], epsilon = 1e-12);
        }
    }
}

#[test]
fn test_hamiltonian_davidson_agrees_with_dense_diagonalisation() {
    let system = random_system(4, 4, 1, 57);
    let (wfn, table) = full_ci_wavefunction(&system);
    let (connections, coupling) = connect(&system, &wfn, &table);
    let evaluator = SigmaEvaluator::new(&system, &wfn, &connections, &coupling, &SingleProcess);

    let dense = evaluator.dense_matrix();
    let (reference, _) = dense.eigh(UPLO::Lower).unwrap();

    let params = DavidsonParams::builder()
        .residual_tolerance(1e-9)
        .build()
        .unwrap();
    let result = davidson::diagonalize(
        2,
        &params,
        || evaluator.diagonal(),
        |diag| {
            let mut order = (0..diag.len()).collect::<Vec<_>>();
            order.sort_by(|&a, &b| diag[a].partial_cmp(&diag[b]).unwrap());
            Ok(order
                .iter()
                .take(3)
                .map(|&at| {
                    let mut v = Array1::zeros(diag.len());
                    v[at] = 1.0;
                    v
                })
                .collect())
        },
        |trial| evaluator.sigma(trial.view()),
    )
    .unwrap();

    assert!(result.converged);
    assert_relative_eq!(result.eigenvalues[0], reference[0], epsilon = 1e-7);
    assert_relative_eq!(result.eigenvalues[1], reference[1], epsilon = 1e-7);
}
