//! CIPSI-style growth of the variational space.
//!
//! Each outer iteration picks the *generator* configurations, those whose
//! coefficient block reaches the generation threshold in any root, and
//! enumerates the first-order-interacting space (FOIS): every configuration
//! reachable from a generator by one or two single excitations that is not yet
//! part of the variational space. Every candidate CSF is scored by the
//! first-order importance estimate
//! ```math
//! \left| \frac{(H c)_\mu}{E - H_{\mu\mu}} \right|
//! ```
//! against the current CI vectors, and the CSFs above the variational threshold
//! are folded back into the wavefunction with catalogue-resolved spin functions.
//!
//! A degenerate (zero) threshold makes the candidate space grow without bound;
//! that is a caller misconfiguration the engine does not police.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array1;

use crate::auxiliary::system::ElectronicSystem;
use crate::connections::ConnectionBuilder;
use crate::coupling::CouplingCoeffs;
use crate::csf::{Cfg, SpinFunctionTable};
use crate::hamiltonian::{cross_sigma, diagonal_of};
use crate::wavefunction::WaveFunction;

#[cfg(test)]
#[path = "selection_tests.rs"]
mod selection_tests;

/// Tallies of one selection pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectionOutcome {
    /// The number of generator configurations.
    pub n_generators: usize,

    /// The number of candidate configurations scored.
    pub n_candidates: usize,

    /// The number of configurations admitted into the variational space.
    pub n_new_cfgs: usize,

    /// The number of CSFs admitted into the variational space.
    pub n_new_csfs: usize,
}

/// Runs one selection pass and appends the admitted configurations to the
/// wavefunction.
///
/// `ci_energies` and `ci_vectors` are the current (electronic) eigenpairs over
/// the wavefunction's CSF basis. New spin-coupling patterns encountered in the
/// candidate space are appended to the catalogue, and the coupling cache is
/// extended by the cross-space blocks the scoring consumes.
#[allow(clippy::too_many_arguments)]
pub fn select_and_grow(
    system: &ElectronicSystem,
    epsilon_gen: f64,
    epsilon_var: f64,
    wavefunction: &mut WaveFunction,
    table: &mut SpinFunctionTable,
    coupling: &mut CouplingCoeffs,
    ci_energies: &[f64],
    ci_vectors: &[Array1<f64>],
) -> SelectionOutcome {
    let mut outcome = SelectionOutcome::default();

    // Generator configurations.
    let mut generators = Vec::new();
    for icfg in 0..wavefunction.n_cfgs() {
        let pos = wavefunction.offset(icfg);
        let dim = wavefunction.block_len(icfg);
        let significant = ci_vectors.iter().any(|ci| {
            (pos..pos + dim).any(|i| ci[i].abs() > epsilon_gen)
        });
        if significant {
            generators.push(icfg);
        }
    }
    outcome.n_generators = generators.len();

    // First-order-interacting space.
    let mut candidates = BTreeSet::new();
    for &icfg in &generators {
        let occ = wavefunction.cfg(icfg).occupation();
        for single in single_excitations(occ) {
            if admissible(&single, system, wavefunction) {
                candidates.insert(single.clone());
            }
            for double in single_excitations(&single) {
                if admissible(&double, system, wavefunction) {
                    candidates.insert(double);
                }
            }
        }
    }
    outcome.n_candidates = candidates.len();
    if candidates.is_empty() {
        return outcome;
    }

    let mut wfn_fois = WaveFunction::new(system.spin());
    for occ in candidates {
        let mut cfg = Cfg::new(system.spin(), occ);
        cfg.generate_all();
        if cfg.n_csfs() == 0 {
            continue;
        }
        cfg.assign_sf_indices(table);
        wfn_fois.insert_cfg(cfg);
    }

    // Cross-space interaction and scoring.
    let builder = ConnectionBuilder::new(system.n_orbitals(), system.min_unpaired());
    let connections = builder.build_cross(&wfn_fois, wavefunction);
    coupling.construct(table, &connections, &wfn_fois, wavefunction);

    let diag = diagonal_of(system, &wfn_fois);
    let importances = ci_energies
        .iter()
        .zip(ci_vectors.iter())
        .map(|(&energy, ci)| {
            let sigma = cross_sigma(
                system,
                &wfn_fois,
                wavefunction,
                &connections,
                coupling,
                ci.view(),
            );
            let mut importance = sigma;
            for (value, &d) in importance.iter_mut().zip(diag.iter()) {
                *value = (*value / (energy - d)).abs();
            }
            importance
        })
        .collect::<Vec<_>>();

    // Admission.
    let mut selected: BTreeMap<Vec<u8>, BTreeSet<usize>> = BTreeMap::new();
    for icfg in 0..wfn_fois.n_cfgs() {
        let cfg = wfn_fois.cfg(icfg);
        let pos = wfn_fois.offset(icfg);
        for (mu, &sf_idx) in cfg.sf_idxs().iter().enumerate() {
            if importances.iter().any(|imp| imp[pos + mu] > epsilon_var) {
                selected
                    .entry(cfg.occupation().to_vec())
                    .or_default()
                    .insert(sf_idx);
            }
        }
    }

    for (occ, sf_idxs) in selected {
        let mut cfg = Cfg::new(system.spin(), occ);
        let nue = cfg.n_unpaired();
        let sfs = sf_idxs
            .iter()
            .map(|&idx| {
                let sf = table
                    .sf(nue, idx)
                    .expect("Admitted spin functions are catalogued.")
                    .to_string();
                (sf, idx)
            })
            .collect::<BTreeMap<String, usize>>();
        cfg.csfs_from_sfs(&sfs);
        outcome.n_new_cfgs += 1;
        outcome.n_new_csfs += cfg.n_csfs();
        wavefunction.insert_cfg(cfg);
    }

    outcome
}

/// All occupation vectors reachable from `occ` by one single excitation.
fn single_excitations(occ: &[u8]) -> Vec<Vec<u8>> {
    let n = occ.len();
    let mut out = Vec::new();
    for q in 0..n {
        if occ[q] == 0 {
            continue;
        }
        for p in 0..n {
            if p == q || occ[p] == 2 {
                continue;
            }
            let mut excited = occ.to_vec();
            excited[q] -= 1;
            excited[p] += 1;
            out.push(excited);
        }
    }
    out
}

/// Whether a candidate occupation vector can join the variational space: enough
/// unpaired electrons for the target spin, and not already present.
fn admissible(occ: &[u8], system: &ElectronicSystem, wavefunction: &WaveFunction) -> bool {
    occ.iter().filter(|&&d| d == 1).count() >= system.min_unpaired()
        && wavefunction.find_cfg(occ).is_none()
}
