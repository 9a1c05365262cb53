//! Iterative extraction of the lowest eigenpairs of an implicit symmetric matrix
//! with the Davidson method.
//!
//! The caller supplies three callbacks: the matrix diagonal, the initial trial
//! vectors built from that diagonal, and the matrix–vector product. The solver
//! expands a trial subspace with diagonal-preconditioned residuals, collapses it
//! onto the current Ritz vectors when it exceeds the trial-vector cap, and stops
//! when every requested root's residual norm drops below the residual tolerance.
//!
//! The callbacks are never called concurrently with one another; each call is
//! synchronous and its result is fully consumed before the next.
//!
//! Exhausting the iteration cap is not an error: the result then carries
//! `converged = false` together with the best available eigenpairs and the
//! per-iteration residual history, since an unconverged estimate is still
//! scientifically useful.

use anyhow::{self, bail, format_err};
use derive_builder::Builder;
use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh, UPLO};
use serde::{Deserialize, Serialize};

use crate::io::format::{gugaci_output, log_subtitle};

#[cfg(test)]
#[path = "davidson_tests.rs"]
mod davidson_tests;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// A structure containing control parameters for the Davidson eigensolver.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct DavidsonParams {
    /// Convergence threshold on the largest residual norm over the requested
    /// roots.
    #[builder(default = "1e-5")]
    pub residual_tolerance: f64,

    /// Correction vectors whose norm falls below this after orthogonalisation
    /// against the subspace are discarded instead of appended.
    #[builder(default = "1e-7")]
    pub discard_tolerance: f64,

    /// The iteration cap.
    #[builder(default = "50")]
    pub max_iterations: usize,

    /// The trial-vector cap at which the subspace collapses onto the current
    /// Ritz vectors.
    #[builder(default = "500")]
    pub max_trial_vectors: usize,

    /// A per-root floor raising [`Self::max_trial_vectors`] for many-root runs.
    #[builder(default = "10")]
    pub max_trial_vectors_per_root: usize,
}

impl Default for DavidsonParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("All Davidson parameters have defaults.")
    }
}

impl DavidsonParams {
    /// Returns a builder to construct a [`DavidsonParams`] structure.
    pub fn builder() -> DavidsonParamsBuilder {
        DavidsonParamsBuilder::default()
    }
}

// -------
// Result
// -------

/// The outcome of a Davidson diagonalisation.
#[derive(Clone, Debug)]
pub struct DavidsonResult {
    /// The eigenvalues in ascending order. Exactly degenerate eigenvalues keep
    /// whatever order the subspace diagonalisation produced.
    pub eigenvalues: Vec<f64>,

    /// The eigenvectors parallel to [`Self::eigenvalues`].
    pub eigenvectors: Vec<Array1<f64>>,

    /// Whether every root met the residual tolerance within the iteration cap.
    /// When `false`, the eigenpairs are the best available estimate.
    pub converged: bool,

    /// The number of expansion iterations performed.
    pub n_iterations: usize,

    /// Per iteration, the residual norms of the requested roots.
    pub residual_history: Vec<Vec<f64>>,
}

// ==============
// Diagonalizer
// ==============

/// Extracts the lowest `n_roots` eigenpairs of the implicit symmetric matrix
/// defined by the `sigma` callback.
///
/// `diag` supplies the matrix diagonal used as preconditioner, `guess` the
/// initial trial vectors (at least `n_roots` of them) and `sigma` the
/// matrix–vector product.
///
/// # Errors
///
/// Errors when the guess supplies fewer vectors than roots, or when the subspace
/// eigendecomposition fails.
pub fn diagonalize<D, G, S>(
    n_roots: usize,
    params: &DavidsonParams,
    diag: D,
    guess: G,
    mut sigma: S,
) -> Result<DavidsonResult, anyhow::Error>
where
    D: FnOnce() -> Array1<f64>,
    G: FnOnce(&Array1<f64>) -> Result<Vec<Array1<f64>>, anyhow::Error>,
    S: FnMut(&Array1<f64>) -> Array1<f64>,
{
    log_subtitle("Davidson diagonalisation");

    let diag = diag();
    let dim = diag.len();

    let mut trial_vectors = guess(&diag)?;
    if trial_vectors.len() < n_roots {
        bail!(
            "The guess supplied {} trial vectors for {n_roots} roots.",
            trial_vectors.len()
        );
    }
    let mut sigma_vectors = trial_vectors
        .iter()
        .map(|trial| sigma(trial))
        .collect::<Vec<_>>();

    let max_trial = params
        .max_trial_vectors
        .max(params.max_trial_vectors_per_root * n_roots);

    let mut eigenvalues = vec![0.0; n_roots];
    let mut eigenvectors: Vec<Array1<f64>> = Vec::new();
    let mut residual_history: Vec<Vec<f64>> = Vec::new();
    let mut converged = false;
    let mut n_iterations = 0;

    for iter in 0..params.max_iterations {
        n_iterations = iter + 1;

        // Subspace Hamiltonian over the trial vectors.
        let n_trial = trial_vectors.len();
        let mut subspace_h = Array2::zeros((n_trial, n_trial));
        for i in 0..n_trial {
            for j in 0..=i {
                let hij = trial_vectors[i].dot(&sigma_vectors[j]);
                subspace_h[(i, j)] = hij;
                subspace_h[(j, i)] = hij;
            }
        }
        let (subspace_vals, subspace_vecs) = subspace_h
            .eigh(UPLO::Lower)
            .map_err(|err| format_err!("Subspace eigendecomposition failed: {err}"))?;

        // Ritz vectors and residuals of the requested roots.
        eigenvectors.clear();
        let mut residuals = Vec::with_capacity(n_roots);
        let mut residual_norms = Vec::with_capacity(n_roots);
        for iroot in 0..n_roots {
            let mut ritz = Array1::zeros(dim);
            let mut residual = Array1::<f64>::zeros(dim);
            for itrial in 0..n_trial {
                let weight = subspace_vecs[(itrial, iroot)];
                ritz = ritz + weight * &trial_vectors[itrial];
                residual = residual
                    + weight * (&sigma_vectors[itrial] - subspace_vals[iroot] * &trial_vectors[itrial]);
            }
            eigenvalues[iroot] = subspace_vals[iroot];
            eigenvectors.push(ritz);
            residual_norms.push(residual.dot(&residual).sqrt());
            residuals.push(residual);
        }
        residual_history.push(residual_norms.clone());

        for (iroot, norm) in residual_norms.iter().enumerate() {
            gugaci_output!(
                "   Iter {iter:3}  root {iroot:3}: E = {:16.10}  |r| = {norm:10.3e}",
                eigenvalues[iroot]
            );
        }

        let max_residual = residual_norms.iter().cloned().fold(0.0, f64::max);
        if max_residual < params.residual_tolerance {
            converged = true;
            gugaci_output!("   Davidson converged after {n_iterations} iterations.");
            break;
        }
        if iter + 1 == params.max_iterations {
            break;
        }

        if n_trial >= max_trial {
            // Collapse the subspace onto the current Ritz vectors.
            let mut collapsed: Vec<Array1<f64>> = Vec::with_capacity(n_roots);
            for ritz in &eigenvectors {
                let mut vector = ritz.clone();
                for kept in &collapsed {
                    let overlap = vector.dot(kept) / kept.dot(kept);
                    vector = vector - overlap * kept;
                }
                let norm = vector.dot(&vector).sqrt();
                if norm > params.discard_tolerance {
                    collapsed.push(vector / norm);
                }
            }
            trial_vectors = collapsed;
            sigma_vectors = trial_vectors
                .iter()
                .map(|trial| sigma(trial))
                .collect::<Vec<_>>();
            continue;
        }

        // Diagonal-preconditioned corrections for the unconverged roots,
        // orthogonalised against the subspace.
        let mut appended = 0;
        for (iroot, residual) in residuals.iter().enumerate() {
            if residual_norms[iroot] < params.residual_tolerance {
                continue;
            }
            let mut correction = Array1::zeros(dim);
            for i in 0..dim {
                let mut denom = diag[i] - eigenvalues[iroot];
                if denom.abs() < 1e-8 {
                    denom = 1e-8_f64.copysign(denom);
                }
                correction[i] = -residual[i] / denom;
            }
            for trial in &trial_vectors {
                let overlap = correction.dot(trial) / trial.dot(trial);
                correction = correction - overlap * trial;
            }
            let norm = correction.dot(&correction).sqrt();
            if norm > params.discard_tolerance {
                trial_vectors.push(correction / norm);
                sigma_vectors.push(sigma(trial_vectors.last().expect("Just appended.")));
                appended += 1;
            } else {
                log::debug!(
                    "Correction vector for root {iroot} discarded: norm {norm:.2e} below {:.2e}.",
                    params.discard_tolerance
                );
            }
        }

        if appended == 0 {
            // No admissible expansion direction remains; the estimate cannot
            // improve further.
            break;
        }
    }

    if !converged {
        gugaci_output!(
            "   Davidson did not converge within {} iterations; returning the best estimate.",
            params.max_iterations
        );
    }

    Ok(DavidsonResult {
        eigenvalues,
        eigenvectors,
        converged,
        n_iterations,
        residual_history,
    })
}
