use approx::assert_relative_eq;
use ndarray::{Array2, Array4};
use ndarray_linalg::{Eigh, UPLO};

use crate::auxiliary::system::ElectronicSystem;
use crate::connections::ConnectionBuilder;
use crate::coupling::CouplingCoeffs;
use crate::csf::{Cfg, SpinFunctionTable};
use crate::drivers::guga_ci::{run, run_from_csfs, GugaCiDriver, GugaCiParams};
use crate::drivers::Driver;
use crate::hamiltonian::SigmaEvaluator;
use crate::parallel::SingleProcess;
use crate::wavefunction::WaveFunction;

fn separable_system(n_orbitals: usize, n_electrons: usize, multiplicity: usize) -> ElectronicSystem {
    let mut h = Array2::zeros((n_orbitals, n_orbitals));
    let mut v = Array2::zeros((n_orbitals, n_orbitals));
    for p in 0..n_orbitals {
        h[(p, p)] = -2.0 + 0.5 * p as f64;
        v[(p, p)] = 0.6 - 0.05 * p as f64;
        for q in 0..p {
            let hval = 0.08 / (1.0 + (p - q) as f64);
            h[(p, q)] = hval;
            h[(q, p)] = hval;
            let vval = 0.1 / (1.0 + (p - q) as f64);
            v[(p, q)] = vval;
            v[(q, p)] = vval;
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

/// Eigenvalues of the full-CI Hamiltonian, via the dense route.
fn full_ci_energies(system: &ElectronicSystem) -> Vec<f64> {
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

    let builder = ConnectionBuilder::new(system.n_orbitals(), system.min_unpaired());
    let connections = builder.build(&wfn);
    let mut coupling = CouplingCoeffs::new();
    coupling.construct(&table, &connections, &wfn, &wfn);
    let evaluator = SigmaEvaluator::new(system, &wfn, &connections, &coupling, &SingleProcess);
    let (values, _) = evaluator.dense_matrix().eigh(UPLO::Lower).unwrap();
    values.to_vec()
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

#[test]
fn test_guga_ci_reaches_full_ci_for_two_electrons() {
    let _ = env_logger::builder().is_test(true).try_init();
    let system = separable_system(4, 2, 1);
    let params = GugaCiParams::builder()
        .epsilon_var(1e-10)
        .energy_tolerance(1e-9)
        .quiet(true)
        .build()
        .unwrap();

    let result = run(&system, 1, &params).unwrap();
    assert!(result.converged);
    assert!(result.davidson_converged);

    // With a negligible variational threshold the selection admits the entire
    // singlet space of two electrons in four orbitals.
    assert_eq!(result.n_cfgs, 10);
    assert_eq!(result.n_csfs, 10);

    let expected = full_ci_energies(&system)[0];
    assert_relative_eq!(result.energies[0], expected, epsilon = 1e-7);
}

#[test]
fn test_guga_ci_two_roots_from_csf_seed() {
    let system = separable_system(4, 2, 1);
    let params = GugaCiParams::builder()
        .epsilon_var(1e-10)
        .energy_tolerance(1e-9)
        .quiet(true)
        .build()
        .unwrap();

    // A multi-root run needs a starting space spanning at least as many CSFs as
    // roots.
    let csfs = ["3000", "1200"].map(String::from);
    let result = run_from_csfs(&system, 2, &params, &csfs).unwrap();
    assert!(result.converged);
    assert!(result.energies[0] <= result.energies[1]);
    assert_eq!(result.ci_vectors.len(), 2);
    assert_eq!(result.ci_vectors[0].len(), result.n_csfs);

    let expected = full_ci_energies(&system);
    assert_relative_eq!(result.energies[0], expected[0], epsilon = 1e-6);
    assert_relative_eq!(result.energies[1], expected[1], epsilon = 1e-6);
}

#[test]
fn test_guga_ci_from_csfs_returns_lowest_diagonal_on_trivial_integrals() {
    let mut h = Array2::zeros((2, 2));
    h[(0, 0)] = -1.0;
    h[(1, 1)] = -0.5;
    let g = Array4::zeros((2, 2, 2, 2));
    let system = ElectronicSystem::new(2, 2, 1, h, g, 0.3).unwrap();

    let csfs = ["30", "03", "12"].map(String::from);
    let params = GugaCiParams::builder().quiet(true).build().unwrap();
    let result = run_from_csfs(&system, 1, &params, &csfs).unwrap();

    assert!(result.converged);
    assert_eq!(result.n_cfgs, 3);
    assert_eq!(result.n_csfs, 3);
    // Electronic energy is the lowest diagonal value; the core energy is added
    // on report.
    assert_relative_eq!(result.energies[0], -2.0 + 0.3, max_relative = 1e-10);

    let significant = result.significant_csfs(0.5);
    assert_eq!(significant[0].len(), 1);
    assert_eq!(significant[0][0].0, "20");
    assert_eq!(significant[0][0].1, "");
    assert_relative_eq!(significant[0][0].2.abs(), 1.0, max_relative = 1e-10);
}

#[test]
fn test_guga_ci_from_csfs_file() {
    let mut h = Array2::zeros((2, 2));
    h[(0, 0)] = -1.0;
    h[(1, 1)] = -0.5;
    let g = Array4::zeros((2, 2, 2, 2));
    let system = ElectronicSystem::new(2, 2, 1, h, g, 0.0).unwrap();

    let path = std::env::temp_dir().join("gugaci_starting_csfs.txt");
    std::fs::write(&path, "30\n03\n12\n").unwrap();
    let params = GugaCiParams::builder().quiet(true).build().unwrap();
    let result = crate::drivers::guga_ci::run_from_csfs_file(&system, 1, &params, &path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(result.n_csfs, 3);
    assert_relative_eq!(result.energies[0], -2.0, max_relative = 1e-10);
}

#[test]
fn test_guga_ci_rejects_invalid_csf_input() {
    let system = separable_system(2, 2, 1);
    let params = GugaCiParams::builder().quiet(true).build().unwrap();

    // Malformed step digit.
    assert!(run_from_csfs(&system, 1, &params, &["34".to_string()]).is_err());
    // Negative intermediate spin.
    assert!(run_from_csfs(&system, 1, &params, &["21".to_string()]).is_err());
    // Wrong electron count.
    assert!(run_from_csfs(&system, 1, &params, &["10".to_string()]).is_err());
    // Wrong orbital count.
    assert!(run_from_csfs(&system, 1, &params, &["300".to_string()]).is_err());
}

#[test]
fn test_guga_ci_driver_interface() {
    let system = separable_system(3, 2, 1);
    let params = GugaCiParams::builder()
        .epsilon_var(1e-10)
        .quiet(true)
        .build()
        .unwrap();
    let mut driver = GugaCiDriver::builder()
        .parameters(&params)
        .system(&system)
        .n_roots(1)
        .build()
        .unwrap();
    assert!(driver.result().is_err());

    driver.run().unwrap();
    let result = driver.result().unwrap();
    assert!(result.energies[0].is_finite());
    assert!(!result.energies_per_iteration.is_empty());
    let last = result.energies_per_iteration.last().unwrap();
    assert_relative_eq!(last[0], result.energies[0], max_relative = 1e-12);
}

#[test]
fn test_guga_ci_density_matrix_builders_are_stubs() {
    let system = separable_system(2, 2, 1);
    let params = GugaCiParams::builder().quiet(true).build().unwrap();
    let result = run(&system, 1, &params).unwrap();
    assert!(result.rdm1(0, 0).is_err());
    assert!(result.rdm2(0, 0).is_err());
}

#[test]
fn test_electronic_system_validation() {
    let h = Array2::zeros((2, 2));
    let g = Array4::zeros((2, 2, 2, 2));
    // Two electrons cannot realise a quartet.
    assert!(ElectronicSystem::new(2, 2, 4, h.clone(), g.clone(), 0.0).is_err());
    // Five electrons do not fit into two orbitals.
    assert!(ElectronicSystem::new(2, 5, 2, h.clone(), g.clone(), 0.0).is_err());
    // Mismatched integral dimensions.
    assert!(ElectronicSystem::new(3, 2, 1, h, g, 0.0).is_err());
}
