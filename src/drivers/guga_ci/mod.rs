//! Driver for selected configuration interaction in the graphical unitary group
//! approach.
//!
//! The driver owns the outer iteration loop: build the wavefunction, build its
//! connections and coupling coefficients, extract the lowest eigenpairs with the
//! Davidson method, grow the variational space by CIPSI selection, and repeat
//! until the energies stop changing, the selection admits nothing new, or the
//! iteration cap is reached.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{self, bail, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use ndarray::{Array1, Array2, Array4};
use ndarray_linalg::{Eigh, UPLO};
use serde::{Deserialize, Serialize};

use crate::auxiliary::system::ElectronicSystem;
use crate::connections::ConnectionBuilder;
use crate::coupling::CouplingCoeffs;
use crate::csf::{occupation_string, spin_function_of, Cfg, SpinFunctionTable};
use crate::davidson::{self, DavidsonParams, DavidsonResult};
use crate::drivers::Driver;
use crate::hamiltonian::SigmaEvaluator;
use crate::io::format::{gugaci_output, gugaci_warn, log_title, GugaCiOutput};
use crate::io::{group_csf_lines, read_csfs_file};
use crate::parallel::{Collective, SingleProcess};
use crate::selection::select_and_grow;
use crate::wavefunction::WaveFunction;

#[cfg(test)]
#[path = "guga_ci_tests.rs"]
mod guga_ci_tests;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

/// A structure containing control parameters for the selected-CI driver.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct GugaCiParams {
    /// Outer-loop convergence threshold on the largest energy change over the
    /// requested roots between consecutive iterations.
    #[builder(default = "1e-5")]
    pub energy_tolerance: f64,

    /// Generation threshold: configurations whose coefficient block reaches this
    /// magnitude in any root act as generators of the candidate space.
    #[builder(default = "1e-2")]
    pub epsilon_gen: f64,

    /// Variational threshold: candidate CSFs whose first-order importance
    /// estimate exceeds this are admitted into the variational space.
    #[builder(default = "1e-5")]
    pub epsilon_var: f64,

    /// The number of lowest-diagonal CSFs spanning the initial guess space.
    #[builder(default = "512")]
    pub guess_dim: usize,

    /// The outer iteration from which the previous CI vectors seed the Davidson
    /// guess instead of the guess-space diagonalisation.
    #[builder(default = "4")]
    pub reuse_eigenvector_from: usize,

    /// The outer iteration cap.
    #[builder(default = "20")]
    pub max_iterations: usize,

    /// Control parameters of the inner Davidson diagonalisations.
    #[builder(default)]
    pub davidson: DavidsonParams,

    /// Suppresses the per-root iteration chatter, leaving one summary line per
    /// outer iteration.
    #[builder(default = "false")]
    pub quiet: bool,
}

impl GugaCiParams {
    /// Returns a builder to construct a [`GugaCiParams`] structure.
    pub fn builder() -> GugaCiParamsBuilder {
        GugaCiParamsBuilder::default()
    }
}

impl Default for GugaCiParams {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("All selected-CI parameters have defaults.")
    }
}

impl fmt::Display for GugaCiParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Energy tolerance: {:.3e}", self.energy_tolerance)?;
        writeln!(f, "Generation threshold: {:.3e}", self.epsilon_gen)?;
        writeln!(f, "Variational threshold: {:.3e}", self.epsilon_var)?;
        writeln!(f, "Guess dimension: {}", self.guess_dim)?;
        writeln!(f, "Reuse eigenvectors from iteration: {}", self.reuse_eigenvector_from)?;
        writeln!(f, "Max iterations: {}", self.max_iterations)?;
        writeln!(f, "Davidson residual tolerance: {:.3e}", self.davidson.residual_tolerance)?;
        writeln!(f, "Davidson max iterations: {}", self.davidson.max_iterations)?;
        Ok(())
    }
}

// --------------
// Starting space
// --------------

/// The variational space a run starts from.
#[derive(Clone, Debug, Default)]
pub enum StartingSpace {
    /// The Hartree–Fock configuration with all its CSFs: lowest orbitals doubly
    /// occupied, then $`2S`$ singly-occupied orbitals.
    #[default]
    HartreeFock,

    /// A caller-supplied list of CSF digit strings, grouped into configurations
    /// by their occupations.
    Csfs(Vec<String>),

    /// A line-delimited CSF file, one digit string per line.
    CsfsFile(PathBuf),
}

// -------
// Result
// -------

/// The outcome of a selected-CI run.
#[derive(Clone, Debug)]
pub struct GugaCiResult {
    /// The total energies (electronic plus core) of the requested roots, in
    /// ascending order.
    pub energies: Vec<f64>,

    /// The CI coefficient vectors parallel to [`Self::energies`], over the CSF
    /// basis of the final wavefunction.
    pub ci_vectors: Vec<Array1<f64>>,

    /// The total energies of every outer iteration.
    pub energies_per_iteration: Vec<Vec<f64>>,

    /// Whether the outer loop met its energy-convergence criterion or exhausted
    /// the candidate space.
    pub converged: bool,

    /// Whether the final Davidson diagonalisation converged.
    pub davidson_converged: bool,

    /// The number of outer iterations performed.
    pub n_iterations: usize,

    /// The number of configurations of the final wavefunction.
    pub n_cfgs: usize,

    /// The number of CSFs of the final wavefunction.
    pub n_csfs: usize,

    /// Per CSF of the final wavefunction, its configuration and spin-function
    /// digit strings.
    csf_labels: Vec<(String, String)>,
}

impl GugaCiResult {
    /// The CSFs whose coefficient magnitude exceeds `cutoff`, per root, as
    /// (configuration string, spin-function string, coefficient) triples in
    /// order of decreasing magnitude.
    pub fn significant_csfs(&self, cutoff: f64) -> Vec<Vec<(String, String, f64)>> {
        self.ci_vectors
            .iter()
            .map(|ci| {
                ci.iter()
                    .enumerate()
                    .filter(|(_, c)| c.abs() > cutoff)
                    .sorted_by(|(_, a), (_, b)| {
                        b.abs()
                            .partial_cmp(&a.abs())
                            .expect("CI coefficients are finite.")
                    })
                    .map(|(i, &c)| {
                        let (cfg, sf) = &self.csf_labels[i];
                        (cfg.clone(), sf.clone(), c)
                    })
                    .collect()
            })
            .collect()
    }

    /// The one-electron reduced density matrix between roots `iroot` and
    /// `jroot`.
    ///
    /// # Errors
    ///
    /// Density-matrix construction is not implemented in this crate.
    pub fn rdm1(&self, _iroot: usize, _jroot: usize) -> Result<Array2<f64>, anyhow::Error> {
        bail!("One-electron reduced density matrices are not implemented.");
    }

    /// The two-electron reduced density matrix between roots `iroot` and
    /// `jroot`.
    ///
    /// # Errors
    ///
    /// Density-matrix construction is not implemented in this crate.
    pub fn rdm2(&self, _iroot: usize, _jroot: usize) -> Result<Array4<f64>, anyhow::Error> {
        bail!("Two-electron reduced density matrices are not implemented.");
    }
}

// ------
// Driver
// ------

/// A driver for selected configuration interaction.
#[derive(Builder)]
pub struct GugaCiDriver<'a> {
    /// The control parameters for the selected-CI run.
    parameters: &'a GugaCiParams,

    /// The many-electron system and its integrals.
    system: &'a ElectronicSystem,

    /// The number of lowest eigenpairs to extract.
    n_roots: usize,

    /// The variational space the run starts from.
    #[builder(default)]
    starting_space: StartingSpace,

    /// The distributed reduce/broadcast capability. Defaults to the trivial
    /// single-process capability.
    #[builder(default = "&SingleProcess")]
    collective: &'a dyn Collective,

    /// The result of the run.
    #[builder(setter(skip), default)]
    result: Option<GugaCiResult>,
}

impl<'a> GugaCiDriver<'a> {
    /// Returns a builder to construct a [`GugaCiDriver`] structure.
    pub fn builder() -> GugaCiDriverBuilder<'a> {
        GugaCiDriverBuilder::default()
    }

    /// Runs the outer selected-CI loop.
    fn solve(&mut self) -> Result<(), anyhow::Error> {
        let params = self.parameters;
        if self.n_roots == 0 {
            bail!("At least one root must be requested.");
        }

        log_title("GUGA selected configuration interaction");
        if !params.quiet {
            params.log_output_display();
        }

        let spin = self.system.spin();
        let mut table = SpinFunctionTable::new();
        let mut wavefunction = WaveFunction::new(spin);
        match &self.starting_space {
            StartingSpace::HartreeFock => {
                gugaci_output!("   Starting from the Hartree-Fock configuration.");
                self.seed_hartree_fock(&mut table, &mut wavefunction);
            }
            StartingSpace::Csfs(lines) => {
                gugaci_output!("   Starting from {} caller-supplied CSFs.", lines.len());
                let groups = group_csf_lines(lines)?;
                self.seed_from_groups(groups, &mut table, &mut wavefunction)?;
            }
            StartingSpace::CsfsFile(path) => {
                gugaci_output!("   Reading starting CSFs from `{}`.", path.display());
                let groups = read_csfs_file(path)?;
                self.seed_from_groups(groups, &mut table, &mut wavefunction)?;
            }
        }
        if wavefunction.n_csfs() < self.n_roots {
            bail!(
                "The starting space has {} CSFs but {} roots were requested.",
                wavefunction.n_csfs(),
                self.n_roots
            );
        }

        let builder = ConnectionBuilder::new(self.system.n_orbitals(), self.system.min_unpaired());
        let mut coupling = CouplingCoeffs::new();
        let mut previous_coeffs: Vec<HashMap<Vec<u8>, f64>> = Vec::new();

        let mut ci_energies: Vec<f64> = Vec::new();
        let mut ci_vectors: Vec<Array1<f64>> = Vec::new();
        let mut energies_per_iteration: Vec<Vec<f64>> = Vec::new();
        let mut converged = false;
        let mut davidson_converged = false;
        let mut n_iterations = 0;

        for iter in 0..=params.max_iterations {
            n_iterations = iter;

            if iter > 0 {
                let outcome = select_and_grow(
                    self.system,
                    params.epsilon_gen,
                    params.epsilon_var,
                    &mut wavefunction,
                    &mut table,
                    &mut coupling,
                    &ci_energies,
                    &ci_vectors,
                );
                gugaci_output!(
                    "   Iteration {iter:3}: {} generators, {} candidates, {} CFGs / {} CSFs admitted.",
                    outcome.n_generators,
                    outcome.n_candidates,
                    outcome.n_new_cfgs,
                    outcome.n_new_csfs
                );
                if outcome.n_new_csfs == 0 {
                    gugaci_output!("   Selection admitted no new CSFs; the variational space is exhausted.");
                    converged = true;
                    break;
                }
            }

            let davidson_result = self.solve_ci(iter, &builder, &mut coupling, &table, &wavefunction, &previous_coeffs)?;
            davidson_converged = davidson_result.converged;
            if !davidson_converged {
                gugaci_warn!("Davidson did not converge at iteration {iter}; continuing with the best estimate.");
            }
            ci_energies = davidson_result.eigenvalues;
            ci_vectors = davidson_result.eigenvectors;
            energies_per_iteration.push(
                ci_energies
                    .iter()
                    .map(|e| e + self.system.core_energy())
                    .collect(),
            );
            previous_coeffs = map_coefficients(&wavefunction, &ci_vectors);

            gugaci_output!(
                "   Iteration {iter:3}: {} CFGs, {} CSFs.",
                wavefunction.n_cfgs(),
                wavefunction.n_csfs()
            );
            if !params.quiet {
                for (iroot, energy) in ci_energies.iter().enumerate() {
                    gugaci_output!(
                        "      E[root {iroot:3}] = {:16.10}",
                        energy + self.system.core_energy()
                    );
                }
            }

            if iter > 0 {
                let previous = &energies_per_iteration[energies_per_iteration.len() - 2];
                let current = &energies_per_iteration[energies_per_iteration.len() - 1];
                let max_diff = current
                    .iter()
                    .zip(previous.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
                if max_diff < params.energy_tolerance {
                    gugaci_output!(
                        "   Energies converged: max change {max_diff:.3e} below {:.3e}.",
                        params.energy_tolerance
                    );
                    converged = true;
                    break;
                }
            }
        }

        let csf_labels = wavefunction
            .iter()
            .flat_map(|cfg| {
                let occ = occupation_string(cfg.occupation());
                cfg.csfs()
                    .iter()
                    .map(move |csf| (occ.clone(), spin_function_of(csf)))
            })
            .collect();

        self.result = Some(GugaCiResult {
            energies: ci_energies
                .iter()
                .map(|e| e + self.system.core_energy())
                .collect(),
            ci_vectors,
            energies_per_iteration,
            converged,
            davidson_converged,
            n_iterations,
            n_cfgs: wavefunction.n_cfgs(),
            n_csfs: wavefunction.n_csfs(),
            csf_labels,
        });
        Ok(())
    }

    /// One variational solve: rebuild the connections and coupling coefficients
    /// of the current wavefunction and run the Davidson diagonalisation.
    fn solve_ci(
        &self,
        iter: usize,
        builder: &ConnectionBuilder,
        coupling: &mut CouplingCoeffs,
        table: &SpinFunctionTable,
        wavefunction: &WaveFunction,
        previous_coeffs: &[HashMap<Vec<u8>, f64>],
    ) -> Result<DavidsonResult, anyhow::Error> {
        coupling.invalidate();
        let connections = builder.build(wavefunction);
        coupling.construct(table, &connections, wavefunction, wavefunction);
        let coupling = &*coupling;

        let evaluator = SigmaEvaluator::new(
            self.system,
            wavefunction,
            &connections,
            coupling,
            self.collective,
        );

        davidson::diagonalize(
            self.n_roots,
            &self.parameters.davidson,
            || evaluator.diagonal(),
            |diag| self.guess(iter, diag, builder, coupling, wavefunction, previous_coeffs),
            |trial| evaluator.sigma(trial.view()),
        )
    }

    /// The initial Davidson trial vectors: the previous CI vectors mapped by CSF
    /// identity once enough outer iterations have passed, otherwise the lowest
    /// eigenvectors of the guess-space Hamiltonian over the lowest-diagonal
    /// CSFs.
    fn guess(
        &self,
        iter: usize,
        diag: &Array1<f64>,
        builder: &ConnectionBuilder,
        coupling: &CouplingCoeffs,
        wavefunction: &WaveFunction,
        previous_coeffs: &[HashMap<Vec<u8>, f64>],
    ) -> Result<Vec<Array1<f64>>, anyhow::Error> {
        let n = wavefunction.n_csfs();

        if iter >= self.parameters.reuse_eigenvector_from && previous_coeffs.len() == self.n_roots {
            let guesses = previous_coeffs
                .iter()
                .map(|coeffs| {
                    let mut vector = Array1::zeros(n);
                    let mut idx = 0;
                    for cfg in wavefunction.iter() {
                        for csf in cfg.csfs() {
                            if let Some(&c) = coeffs.get(csf) {
                                vector[idx] = c;
                            }
                            idx += 1;
                        }
                    }
                    vector
                })
                .collect();
            return Ok(guesses);
        }

        let guess_dim = self.parameters.guess_dim.clamp(self.n_roots, n);

        // The guess-dim lowest diagonal entries, grouped by configuration.
        let mut order = (0..n).collect::<Vec<_>>();
        order.sort_by(|&a, &b| {
            diag[a]
                .partial_cmp(&diag[b])
                .expect("Hamiltonian diagonal values are finite.")
        });
        let mut csf_of = Vec::with_capacity(n);
        for icfg in 0..wavefunction.n_cfgs() {
            for icsf in 0..wavefunction.block_len(icfg) {
                csf_of.push((icfg, icsf));
            }
        }
        let mut by_cfg: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for &i in order.iter().take(guess_dim) {
            let (icfg, icsf) = csf_of[i];
            by_cfg.entry(icfg).or_default().insert(icsf);
        }

        // The guess wavefunction and the scatter map back to full positions.
        let mut wfn_guess = WaveFunction::new(self.system.spin());
        let mut scatter = Vec::with_capacity(guess_dim);
        for (&icfg, icsfs) in &by_cfg {
            let parent = wavefunction.cfg(icfg);
            let mut cfg = Cfg::new(self.system.spin(), parent.occupation().to_vec());
            for &icsf in icsfs {
                cfg.insert_csf(parent.sf_idxs()[icsf], parent.csf(icsf).to_vec());
                scatter.push(wavefunction.offset(icfg) + icsf);
            }
            wfn_guess.insert_cfg(cfg);
        }

        // The guess-space Hamiltonian. Its coupling blocks are sub-blocks of the
        // ones already cached for the full wavefunction.
        let connections_guess = builder.build(&wfn_guess);
        let evaluator = SigmaEvaluator::new(
            self.system,
            &wfn_guess,
            &connections_guess,
            coupling,
            &SingleProcess,
        );
        let h_guess = evaluator.dense_matrix();
        let (_, eigenvectors) = h_guess
            .eigh(UPLO::Lower)
            .map_err(|err| format_err!("Guess-space eigendecomposition failed: {err}"))?;

        let guesses = (0..self.n_roots)
            .map(|iroot| {
                let mut vector = Array1::zeros(n);
                for (k, &global) in scatter.iter().enumerate() {
                    vector[global] = eigenvectors[(k, iroot)];
                }
                vector
            })
            .collect();
        Ok(guesses)
    }

    /// Seeds the wavefunction with the Hartree–Fock configuration carrying all
    /// spin couplings of its unpaired electrons.
    fn seed_hartree_fock(&self, table: &mut SpinFunctionTable, wavefunction: &mut WaveFunction) {
        let mut occ = vec![0u8; self.system.n_orbitals()];
        let mut remaining = self.system.n_electrons();
        let min_unpaired = self.system.min_unpaired();
        for digit in occ.iter_mut() {
            if remaining == 0 {
                break;
            }
            if remaining > min_unpaired + 1 {
                *digit = 2;
                remaining -= 2;
            } else {
                *digit = 1;
                remaining -= 1;
            }
        }

        let mut cfg = Cfg::new(self.system.spin(), occ);
        let nue = cfg.n_unpaired();
        table.create_all(self.system.spin(), nue);
        let sfs = (0..table.len(nue))
            .map(|idx| {
                (
                    table
                        .sf(nue, idx)
                        .expect("The catalogue was just created.")
                        .to_string(),
                    idx,
                )
            })
            .collect::<BTreeMap<String, usize>>();
        cfg.csfs_from_sfs(&sfs);
        wavefunction.insert_cfg(cfg);
    }

    /// Seeds the wavefunction from externally supplied CSFs grouped by
    /// configuration.
    fn seed_from_groups(
        &self,
        groups: Vec<(Vec<u8>, Vec<Vec<u8>>)>,
        table: &mut SpinFunctionTable,
        wavefunction: &mut WaveFunction,
    ) -> Result<(), anyhow::Error> {
        let b_target = (2.0 * self.system.spin()).round() as i32;
        for (occ, mut csfs) in groups {
            if occ.len() != self.system.n_orbitals() {
                bail!(
                    "CSF `{}` spans {} orbitals but the system has {}.",
                    occupation_string(&occ),
                    occ.len(),
                    self.system.n_orbitals()
                );
            }
            let n_el = occ.iter().map(|&d| usize::from(d)).sum::<usize>();
            if n_el != self.system.n_electrons() {
                bail!(
                    "CSFs of configuration `{}` carry {n_el} electrons but the system has {}.",
                    occupation_string(&occ),
                    self.system.n_electrons()
                );
            }

            let mut cfg = Cfg::new(self.system.spin(), occ);
            let nue = cfg.n_unpaired();
            csfs.sort();
            for csf in csfs {
                validate_walk(&csf, b_target)?;
                let sf = spin_function_of(&csf);
                let sf_idx = table.insert(nue, sf);
                cfg.insert_csf(sf_idx, csf);
            }
            wavefunction.insert_cfg(cfg);
        }
        Ok(())
    }
}

impl Driver for GugaCiDriver<'_> {
    type Params = GugaCiParams;
    type Outcome = GugaCiResult;

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.solve()
    }

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No selected-CI result found."))
    }
}

/// Checks that a step vector traces a valid Shavitt-graph walk ending at the
/// target spin.
fn validate_walk(csf: &[u8], b_target: i32) -> Result<(), anyhow::Error> {
    let mut b = 0;
    for &d in csf {
        b += match d {
            1 => 1,
            2 => -1,
            _ => 0,
        };
        if b < 0 {
            bail!(
                "CSF `{}` couples to a negative intermediate spin.",
                crate::csf::step_vector_string(csf)
            );
        }
    }
    if b != b_target {
        bail!(
            "CSF `{}` couples to 2S = {b} instead of the requested 2S = {b_target}.",
            crate::csf::step_vector_string(csf)
        );
    }
    Ok(())
}

/// Indexes the CI coefficients by CSF identity for reuse as a later guess.
fn map_coefficients(
    wavefunction: &WaveFunction,
    ci_vectors: &[Array1<f64>],
) -> Vec<HashMap<Vec<u8>, f64>> {
    ci_vectors
        .iter()
        .map(|ci| {
            let mut coeffs = HashMap::with_capacity(ci.len());
            let mut idx = 0;
            for cfg in wavefunction.iter() {
                for csf in cfg.csfs() {
                    coeffs.insert(csf.clone(), ci[idx]);
                    idx += 1;
                }
            }
            coeffs
        })
        .collect()
}

// ================
// Free functions
// ================

/// Runs selected CI from the Hartree–Fock-seeded starting space.
///
/// # Errors
///
/// Errors on invalid inputs or when the inner eigensolver cannot be set up; see
/// [`GugaCiDriver`].
pub fn run(
    system: &ElectronicSystem,
    n_roots: usize,
    params: &GugaCiParams,
) -> Result<GugaCiResult, anyhow::Error> {
    let mut driver = GugaCiDriver::builder()
        .parameters(params)
        .system(system)
        .n_roots(n_roots)
        .build()?;
    driver.run()?;
    driver.result().cloned()
}

/// Runs selected CI starting from a caller-supplied CSF list, one digit string
/// per entry.
///
/// # Errors
///
/// Errors on malformed CSF strings or invalid inputs; see [`GugaCiDriver`].
pub fn run_from_csfs(
    system: &ElectronicSystem,
    n_roots: usize,
    params: &GugaCiParams,
    csfs: &[String],
) -> Result<GugaCiResult, anyhow::Error> {
    let mut driver = GugaCiDriver::builder()
        .parameters(params)
        .system(system)
        .n_roots(n_roots)
        .starting_space(StartingSpace::Csfs(csfs.to_vec()))
        .build()?;
    driver.run()?;
    driver.result().cloned()
}

/// Runs selected CI starting from a line-delimited CSF file.
///
/// # Errors
///
/// Errors when the file cannot be read, on malformed CSF strings or invalid
/// inputs; see [`GugaCiDriver`].
pub fn run_from_csfs_file(
    system: &ElectronicSystem,
    n_roots: usize,
    params: &GugaCiParams,
    path: impl AsRef<Path>,
) -> Result<GugaCiResult, anyhow::Error> {
    let mut driver = GugaCiDriver::builder()
        .parameters(params)
        .system(system)
        .n_roots(n_roots)
        .starting_space(StartingSpace::CsfsFile(path.as_ref().to_path_buf()))
        .build()?;
    driver.run()?;
    driver.result().cloned()
}
