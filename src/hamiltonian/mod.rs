//! Matrix-free evaluation of the CI Hamiltonian.
//!
//! The Hamiltonian over the CSF basis of a wavefunction is never materialised.
//! Its action on a trial coefficient vector (the *sigma vector*) is assembled
//! from four contribution classes: the configuration-diagonal occupation terms,
//! the diagonal exchange through the intermediate space, and the off-diagonal
//! single- and double-excitation terms recorded in the connection maps, each
//! weighted by its integral value and coupling-coefficient block.
//!
//! The same contribution classes also yield the Hamiltonian diagonal (the
//! Davidson preconditioner) and, for small guess spaces, an explicit dense
//! matrix.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;

use crate::auxiliary::index::{unpack_pq, unpack_pqrs};
use crate::auxiliary::system::ElectronicSystem;
use crate::connections::ConnectionSet;
use crate::coupling::{diagonal_exchange, CouplingCoeffs};
use crate::parallel::Collective;
use crate::wavefunction::WaveFunction;

#[cfg(test)]
#[path = "hamiltonian_tests.rs"]
mod hamiltonian_tests;

// ==================
// Struct definitions
// ==================

/// The matrix-free Hamiltonian evaluator of one wavefunction generation.
///
/// All borrowed state is read-only: the evaluator never mutates the
/// wavefunction, the connection maps or the coupling cache, so one evaluator may
/// be driven repeatedly by the eigensolver.
pub struct SigmaEvaluator<'a> {
    system: &'a ElectronicSystem,
    wavefunction: &'a WaveFunction,
    connections: &'a ConnectionSet,
    coupling: &'a CouplingCoeffs,
    comm: &'a dyn Collective,
}

impl<'a> SigmaEvaluator<'a> {
    /// Creates an evaluator over the given wavefunction generation.
    pub fn new(
        system: &'a ElectronicSystem,
        wavefunction: &'a WaveFunction,
        connections: &'a ConnectionSet,
        coupling: &'a CouplingCoeffs,
        comm: &'a dyn Collective,
    ) -> Self {
        Self {
            system,
            wavefunction,
            connections,
            coupling,
            comm,
        }
    }

    /// The diagonal of the Hamiltonian, one value per CSF.
    pub fn diagonal(&self) -> Array1<f64> {
        let (rank, size) = (self.comm.rank(), self.comm.size());
        let n = self.wavefunction.n_csfs();
        let mut diag = (0..self.wavefunction.n_cfgs())
            .into_par_iter()
            .filter(|icfg| icfg % size == rank)
            .fold(
                || Array1::<f64>::zeros(n),
                |mut acc, icfg| {
                    accumulate_cfg_diagonal(self.system, self.wavefunction, icfg, &mut acc);
                    acc
                },
            )
            .reduce(|| Array1::<f64>::zeros(n), |a, b| a + b);
        if let Some(slice) = diag.as_slice_mut() {
            self.comm.all_reduce_sum(slice);
        }
        diag
    }

    /// The sigma vector $`\sigma = H c`$ for the trial vector `trial`.
    ///
    /// The result has the same length and block layout as the input.
    pub fn sigma(&self, trial: ArrayView1<f64>) -> Array1<f64> {
        let (rank, size) = (self.comm.rank(), self.comm.size());
        let n = self.wavefunction.n_csfs();

        // Configuration-diagonal occupation terms.
        let no_exc = (0..self.wavefunction.n_cfgs())
            .into_par_iter()
            .filter(|icfg| icfg % size == rank)
            .fold(
                || Array1::<f64>::zeros(n),
                |mut acc, icfg| {
                    let val = cfg_diagonal_value(self.system, self.wavefunction, icfg);
                    let pos = self.wavefunction.offset(icfg);
                    let dim = self.wavefunction.block_len(icfg);
                    for mu in 0..dim {
                        acc[pos + mu] += val * trial[pos + mu];
                    }
                    acc
                },
            )
            .reduce(|| Array1::<f64>::zeros(n), |a, b| a + b);

        // Single excitations.
        let one_el = self
            .connections
            .one_el
            .par_iter()
            .enumerate()
            .filter(|(ientry, _)| ientry % size == rank)
            .fold(
                || Array1::<f64>::zeros(n),
                |mut acc, (_, (key, conns))| {
                    let ccs = self.coupling.one_el(key);
                    for conn in conns {
                        let (p, q) = unpack_pq(conn.pq, self.system.n_orbitals());
                        let contrib =
                            one_el_contrib(self.system, self.wavefunction, conn.icfg_left, conn.icfg_right, p, q)
                                * (if conn.phase { -1.0 } else { 1.0 });

                        let pos_left = self.wavefunction.offset(conn.icfg_left);
                        let pos_right = self.wavefunction.offset(conn.icfg_right);
                        let sf_left = self.wavefunction.cfg(conn.icfg_left).sf_idxs();
                        let sf_right = self.wavefunction.cfg(conn.icfg_right).sf_idxs();
                        for (mu, &sl) in sf_left.iter().enumerate() {
                            for (nu, &sr) in sf_right.iter().enumerate() {
                                let cc = ccs.get(&(sl, sr)).copied().unwrap_or(0.0);
                                acc[pos_left + mu] += contrib * cc * trial[pos_right + nu];
                                acc[pos_right + nu] += contrib * cc * trial[pos_left + mu];
                            }
                        }
                    }
                    acc
                },
            )
            .reduce(|| Array1::<f64>::zeros(n), |a, b| a + b);

        // Excitations to the intermediate space and back.
        let dia = self
            .connections
            .diagonal
            .par_iter()
            .enumerate()
            .filter(|(ientry, _)| ientry % size == rank)
            .fold(
                || Array1::<f64>::zeros(n),
                |mut acc, (_, (key, conns))| {
                    let ccs = self.coupling.diagonal(key);
                    for conn in conns {
                        let (p, q, r, s) = unpack_pqrs(conn.pqqp, self.system.n_orbitals());
                        let contrib = 0.5 * self.system.two_el_ints()[(p, q, r, s)];

                        let pos = self.wavefunction.offset(conn.icfg);
                        let sf_idxs = self.wavefunction.cfg(conn.icfg).sf_idxs();
                        for (mu, &sl) in sf_idxs.iter().enumerate() {
                            for (nu, &sr) in sf_idxs.iter().enumerate() {
                                let cc = ccs.get(&(sl, sr)).copied().unwrap_or(0.0);
                                acc[pos + mu] += contrib * cc * trial[pos + nu];
                            }
                        }
                    }
                    acc
                },
            )
            .reduce(|| Array1::<f64>::zeros(n), |a, b| a + b);

        // Double excitations.
        let two_el = self
            .connections
            .two_el
            .par_iter()
            .enumerate()
            .filter(|(ientry, _)| ientry % size == rank)
            .fold(
                || Array1::<f64>::zeros(n),
                |mut acc, (_, (key, conns))| {
                    let ccs = self.coupling.two_el(key);
                    for conn in conns {
                        let (p, q, r, s) = unpack_pqrs(conn.pqrs, self.system.n_orbitals());
                        let fac = (if conn.exchange { 1.0 } else { 0.5 })
                            * (if conn.phase { -1.0 } else { 1.0 });
                        let contrib = fac * self.system.two_el_ints()[(p, q, r, s)];

                        let pos_left = self.wavefunction.offset(conn.icfg_left);
                        let pos_right = self.wavefunction.offset(conn.icfg_right);
                        let sf_left = self.wavefunction.cfg(conn.icfg_left).sf_idxs();
                        let sf_right = self.wavefunction.cfg(conn.icfg_right).sf_idxs();
                        for (mu, &sl) in sf_left.iter().enumerate() {
                            for (nu, &sr) in sf_right.iter().enumerate() {
                                let cc = ccs.get(&(sl, sr)).copied().unwrap_or(0.0);
                                acc[pos_left + mu] += contrib * cc * trial[pos_right + nu];
                                acc[pos_right + nu] += contrib * cc * trial[pos_left + mu];
                            }
                        }
                    }
                    acc
                },
            )
            .reduce(|| Array1::<f64>::zeros(n), |a, b| a + b);

        let mut sigma = no_exc + one_el + dia + two_el;
        if let Some(slice) = sigma.as_slice_mut() {
            self.comm.all_reduce_sum(slice);
        }
        sigma
    }

    /// The explicit Hamiltonian matrix of the wavefunction. Intended for small
    /// (guess) spaces only.
    pub fn dense_matrix(&self) -> Array2<f64> {
        let n = self.wavefunction.n_csfs();
        let mut h = Array2::zeros((n, n));

        for icfg in 0..self.wavefunction.n_cfgs() {
            let val = cfg_diagonal_value(self.system, self.wavefunction, icfg);
            let pos = self.wavefunction.offset(icfg);
            for mu in 0..self.wavefunction.block_len(icfg) {
                h[(pos + mu, pos + mu)] += val;
            }
        }

        for (key, conns) in self.connections.one_el.iter() {
            let ccs = self.coupling.one_el(key);
            for conn in conns {
                let (p, q) = unpack_pq(conn.pq, self.system.n_orbitals());
                let contrib =
                    one_el_contrib(self.system, self.wavefunction, conn.icfg_left, conn.icfg_right, p, q)
                        * (if conn.phase { -1.0 } else { 1.0 });

                let pos_left = self.wavefunction.offset(conn.icfg_left);
                let pos_right = self.wavefunction.offset(conn.icfg_right);
                let sf_left = self.wavefunction.cfg(conn.icfg_left).sf_idxs();
                let sf_right = self.wavefunction.cfg(conn.icfg_right).sf_idxs();
                for (mu, &sl) in sf_left.iter().enumerate() {
                    for (nu, &sr) in sf_right.iter().enumerate() {
                        let cc = ccs.get(&(sl, sr)).copied().unwrap_or(0.0);
                        h[(pos_left + mu, pos_right + nu)] += contrib * cc;
                        h[(pos_right + nu, pos_left + mu)] += contrib * cc;
                    }
                }
            }
        }

        for (key, conns) in self.connections.diagonal.iter() {
            let ccs = self.coupling.diagonal(key);
            for conn in conns {
                let (p, q, r, s) = unpack_pqrs(conn.pqqp, self.system.n_orbitals());
                let contrib = 0.5 * self.system.two_el_ints()[(p, q, r, s)];

                let pos = self.wavefunction.offset(conn.icfg);
                let sf_idxs = self.wavefunction.cfg(conn.icfg).sf_idxs();
                for (mu, &sl) in sf_idxs.iter().enumerate() {
                    for (nu, &sr) in sf_idxs.iter().enumerate() {
                        let cc = ccs.get(&(sl, sr)).copied().unwrap_or(0.0);
                        h[(pos + mu, pos + nu)] += contrib * cc;
                    }
                }
            }
        }

        for (key, conns) in self.connections.two_el.iter() {
            let ccs = self.coupling.two_el(key);
            for conn in conns {
                let (p, q, r, s) = unpack_pqrs(conn.pqrs, self.system.n_orbitals());
                let fac = (if conn.exchange { 1.0 } else { 0.5 })
                    * (if conn.phase { -1.0 } else { 1.0 });
                let contrib = fac * self.system.two_el_ints()[(p, q, r, s)];

                let pos_left = self.wavefunction.offset(conn.icfg_left);
                let pos_right = self.wavefunction.offset(conn.icfg_right);
                let sf_left = self.wavefunction.cfg(conn.icfg_left).sf_idxs();
                let sf_right = self.wavefunction.cfg(conn.icfg_right).sf_idxs();
                for (mu, &sl) in sf_left.iter().enumerate() {
                    for (nu, &sr) in sf_right.iter().enumerate() {
                        let cc = ccs.get(&(sl, sr)).copied().unwrap_or(0.0);
                        h[(pos_left + mu, pos_right + nu)] += contrib * cc;
                        h[(pos_right + nu, pos_left + mu)] += contrib * cc;
                    }
                }
            }
        }

        h
    }
}

/// The Hamiltonian diagonal of an arbitrary wavefunction, evaluated serially.
/// Used for the perturbative screening of candidate spaces.
pub(crate) fn diagonal_of(system: &ElectronicSystem, wfn: &WaveFunction) -> Array1<f64> {
    let mut diag = Array1::zeros(wfn.n_csfs());
    for icfg in 0..wfn.n_cfgs() {
        accumulate_cfg_diagonal(system, wfn, icfg, &mut diag);
    }
    diag
}

/// The cross-space sigma vector $`H_{\mathrm{left}, \mathrm{right}}\, c`$ of a
/// candidate space against the coefficients `ci` of the variational space.
/// Accumulation is one-sided: only the candidate-space entries are produced.
pub(crate) fn cross_sigma(
    system: &ElectronicSystem,
    wfn_left: &WaveFunction,
    wfn_right: &WaveFunction,
    connections: &ConnectionSet,
    coupling: &CouplingCoeffs,
    ci: ArrayView1<f64>,
) -> Array1<f64> {
    let mut sigma = Array1::zeros(wfn_left.n_csfs());

    for (key, conns) in connections.one_el.iter() {
        let ccs = coupling.one_el(key);
        for conn in conns {
            let (p, q) = unpack_pq(conn.pq, system.n_orbitals());
            let occ_left = wfn_left.cfg(conn.icfg_left).occupation();
            let occ_right = wfn_right.cfg(conn.icfg_right).occupation();
            let contrib = one_el_contrib_between(system, occ_left, occ_right, p, q)
                * (if conn.phase { -1.0 } else { 1.0 });

            let pos_left = wfn_left.offset(conn.icfg_left);
            let pos_right = wfn_right.offset(conn.icfg_right);
            let sf_left = wfn_left.cfg(conn.icfg_left).sf_idxs();
            let sf_right = wfn_right.cfg(conn.icfg_right).sf_idxs();
            for (mu, &sl) in sf_left.iter().enumerate() {
                for (nu, &sr) in sf_right.iter().enumerate() {
                    let cc = ccs.get(&(sl, sr)).copied().unwrap_or(0.0);
                    sigma[pos_left + mu] += contrib * cc * ci[pos_right + nu];
                }
            }
        }
    }

    for (key, conns) in connections.two_el.iter() {
        let ccs = coupling.two_el(key);
        for conn in conns {
            let (p, q, r, s) = unpack_pqrs(conn.pqrs, system.n_orbitals());
            let fac = (if conn.exchange { 1.0 } else { 0.5 })
                * (if conn.phase { -1.0 } else { 1.0 });
            let contrib = fac * system.two_el_ints()[(p, q, r, s)];

            let pos_left = wfn_left.offset(conn.icfg_left);
            let pos_right = wfn_right.offset(conn.icfg_right);
            let sf_left = wfn_left.cfg(conn.icfg_left).sf_idxs();
            let sf_right = wfn_right.cfg(conn.icfg_right).sf_idxs();
            for (mu, &sl) in sf_left.iter().enumerate() {
                for (nu, &sr) in sf_right.iter().enumerate() {
                    let cc = ccs.get(&(sl, sr)).copied().unwrap_or(0.0);
                    sigma[pos_left + mu] += contrib * cc * ci[pos_right + nu];
                }
            }
        }
    }

    sigma
}

/// The CSF-independent diagonal value of one configuration: effective
/// one-electron and Coulomb-like two-electron occupation terms.
fn cfg_diagonal_value(system: &ElectronicSystem, wfn: &WaveFunction, icfg: usize) -> f64 {
    let occ = wfn.cfg(icfg).occupation();
    let h = system.one_el_ints();
    let g = system.two_el_ints();

    let mut val = 0.0;
    for (p, &occ_p) in occ.iter().enumerate() {
        if occ_p == 0 {
            continue;
        }
        let occ_p = f64::from(occ_p);
        val += occ_p * (h[(p, p)] + 0.5 * occ_p * g[(p, p, p, p)]);
        for (q, &occ_q) in occ.iter().enumerate().skip(p + 1) {
            if occ_q == 0 {
                continue;
            }
            val += occ_p * f64::from(occ_q) * g[(p, p, q, q)];
        }
    }
    val
}

/// Adds the Hamiltonian diagonal of one configuration block, with the exchange
/// terms from the closed-form diagonal coupling factors. Serves as the Davidson
/// preconditioner and the screening denominator.
fn accumulate_cfg_diagonal(
    system: &ElectronicSystem,
    wfn: &WaveFunction,
    icfg: usize,
    diag: &mut Array1<f64>,
) {
    let cfg = wfn.cfg(icfg);
    let occ = cfg.occupation();
    let h = system.one_el_ints();
    let g = system.two_el_ints();
    let pos = wfn.offset(icfg);
    let dim = wfn.block_len(icfg);

    let mut val = 0.0;
    for (p, &occ_p) in occ.iter().enumerate() {
        if occ_p == 0 {
            continue;
        }
        val += f64::from(occ_p) * h[(p, p)];
        if occ_p == 2 {
            val += g[(p, p, p, p)];
        }
        for (q, &occ_q) in occ.iter().enumerate().skip(p + 1) {
            if occ_q == 0 {
                continue;
            }
            val += f64::from(occ_p) * f64::from(occ_q) * g[(p, p, q, q)];
        }
    }
    for mu in 0..dim {
        diag[pos + mu] += val;
    }

    for (p, &occ_p) in occ.iter().enumerate() {
        if occ_p == 0 {
            continue;
        }
        for (q, &occ_q) in occ.iter().enumerate().skip(p + 1) {
            if occ_q == 0 {
                continue;
            }
            let ccx = diagonal_exchange(p, q, cfg);
            let pair = f64::from(occ_p) * f64::from(occ_q);
            for mu in 0..dim {
                diag[pos + mu] -= 0.5 * g[(p, q, q, p)] * (pair + ccx[mu]);
            }
        }
    }
}

/// The integral weight of a single-excitation connection within one
/// wavefunction: the effective one-electron integral plus the
/// occupation-weighted Coulomb-like two-electron sums over both configurations.
fn one_el_contrib(
    system: &ElectronicSystem,
    wfn: &WaveFunction,
    icfg_left: usize,
    icfg_right: usize,
    p: usize,
    q: usize,
) -> f64 {
    one_el_contrib_between(
        system,
        wfn.cfg(icfg_left).occupation(),
        wfn.cfg(icfg_right).occupation(),
        p,
        q,
    )
}

fn one_el_contrib_between(
    system: &ElectronicSystem,
    occ_left: &[u8],
    occ_right: &[u8],
    p: usize,
    q: usize,
) -> f64 {
    let g = system.two_el_ints();
    let mut contrib = system.one_el_ints()[(p, q)];
    for (r, &occ_r) in occ_right.iter().enumerate() {
        if occ_r != 0 {
            contrib += 0.5 * f64::from(occ_r) * g[(p, q, r, r)];
        }
    }
    for (r, &occ_r) in occ_left.iter().enumerate() {
        if occ_r != 0 {
            contrib += 0.5 * f64::from(occ_r) * g[(r, r, p, q)];
        }
    }
    contrib
}
