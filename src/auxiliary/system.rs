//! Specification of the many-electron system whose CI eigenpairs are sought.
//!
//! The integral tensors are consumed as opaque dense arrays over
//! molecular-orbital indices. The crate is agnostic to the physicist/chemist
//! index convention as long as it is used consistently, since the
//! coupling-coefficient phase conventions are fixed independently of it.

use anyhow::{self, bail};
use ndarray::{Array2, Array4};

/// A many-electron system together with its molecular-orbital integrals.
///
/// On construction, the bare one-electron integrals $`h_{pq}`$ are folded with
/// the two-electron exchange contraction into the effective integrals
/// ```math
/// h'_{pq} = h_{pq} - \tfrac{1}{2} \sum_r (pr|rq),
/// ```
/// which is the form in which the spin-free Hamiltonian
/// $`\hat{H} = \sum_{pq} h'_{pq} \hat{E}_{pq}
/// + \tfrac{1}{2} \sum_{pqrs} (pq|rs) \hat{E}_{pq}\hat{E}_{rs}`$
/// is evaluated throughout the crate.
#[derive(Clone, Debug)]
pub struct ElectronicSystem {
    /// The number of molecular orbitals spanned by the integrals.
    n_orbitals: usize,

    /// The number of electrons.
    n_electrons: usize,

    /// The spin multiplicity $`2S + 1`$.
    multiplicity: usize,

    /// The total spin $`S`$.
    spin: f64,

    /// The minimum number of unpaired electrons, $`2S`$, any configuration of the
    /// system can have.
    min_unpaired: usize,

    /// The effective one-electron integrals $`h'_{pq}`$.
    one_el_ints: Array2<f64>,

    /// The two-electron integrals $`(pq|rs)`$.
    two_el_ints: Array4<f64>,

    /// The core (*e.g.* nuclear-repulsion) energy added to the electronic
    /// eigenvalues on report.
    core_energy: f64,
}

impl ElectronicSystem {
    /// Validates the inputs and constructs an [`ElectronicSystem`], folding the
    /// exchange contraction into the one-electron integrals.
    ///
    /// # Errors
    ///
    /// Errors when the integral dimensions disagree with `n_orbitals`, or when the
    /// electron count cannot realise the requested multiplicity.
    pub fn new(
        n_orbitals: usize,
        n_electrons: usize,
        multiplicity: usize,
        one_el_ints: Array2<f64>,
        two_el_ints: Array4<f64>,
        core_energy: f64,
    ) -> Result<Self, anyhow::Error> {
        if one_el_ints.dim() != (n_orbitals, n_orbitals) {
            bail!(
                "One-electron integral dimensions {:?} do not match the orbital count {n_orbitals}.",
                one_el_ints.dim()
            );
        }
        if two_el_ints.dim() != (n_orbitals, n_orbitals, n_orbitals, n_orbitals) {
            bail!(
                "Two-electron integral dimensions {:?} do not match the orbital count {n_orbitals}.",
                two_el_ints.dim()
            );
        }
        if multiplicity == 0 {
            bail!("The spin multiplicity must be at least 1.");
        }
        let min_unpaired = multiplicity - 1;
        if n_electrons < min_unpaired || (n_electrons - min_unpaired) % 2 != 0 {
            bail!(
                "{n_electrons} electrons cannot realise a spin multiplicity of {multiplicity}."
            );
        }
        if n_electrons > 2 * n_orbitals {
            bail!(
                "{n_electrons} electrons do not fit into {n_orbitals} orbitals."
            );
        }

        let mut eff_one_el_ints = one_el_ints;
        for p in 0..n_orbitals {
            for q in 0..n_orbitals {
                let exchange = (0..n_orbitals)
                    .map(|r| two_el_ints[(p, r, r, q)])
                    .sum::<f64>();
                eff_one_el_ints[(p, q)] -= 0.5 * exchange;
            }
        }

        Ok(Self {
            n_orbitals,
            n_electrons,
            multiplicity,
            spin: 0.5 * (multiplicity as f64 - 1.0),
            min_unpaired,
            one_el_ints: eff_one_el_ints,
            two_el_ints,
            core_energy,
        })
    }

    /// The number of molecular orbitals.
    pub fn n_orbitals(&self) -> usize {
        self.n_orbitals
    }

    /// The number of electrons.
    pub fn n_electrons(&self) -> usize {
        self.n_electrons
    }

    /// The spin multiplicity $`2S + 1`$.
    pub fn multiplicity(&self) -> usize {
        self.multiplicity
    }

    /// The total spin $`S`$.
    pub fn spin(&self) -> f64 {
        self.spin
    }

    /// The minimum number of unpaired electrons, $`2S`$.
    pub fn min_unpaired(&self) -> usize {
        self.min_unpaired
    }

    /// The effective one-electron integrals $`h'_{pq}`$.
    pub fn one_el_ints(&self) -> &Array2<f64> {
        &self.one_el_ints
    }

    /// The two-electron integrals $`(pq|rs)`$.
    pub fn two_el_ints(&self) -> &Array4<f64> {
        &self.two_el_ints
    }

    /// The core energy.
    pub fn core_energy(&self) -> f64 {
        self.core_energy
    }
}
