//! Coupling coefficients between the CSFs of excitation-connected configurations.
//!
//! For a pair of configurations connected by one or two spin-free excitation
//! operators $`\hat{E}_{pq}`$, the matrix elements
//! $`\langle \mu | \hat{E}_{pq} | \nu \rangle`$ between their CSFs depend only on
//! the relative spin-coupling topology, not on the absolute orbital indices. They
//! are therefore computed on *prototype* configurations (all-singly-occupied
//! model configurations of minimal length) and cached under a canonical key so
//! every connected pair of configurations with the same topology shares one dense
//! block, indexed by global spin-function indices.
//!
//! The blocks themselves come out of synchronous walks over the paired Shavitt
//! graphs of the prototypes (see [`kernels`]); two-operator blocks are products of
//! two one-operator factors through the intermediate ("RI") configuration, and the
//! same-configuration diagonal blocks are Gram products of a single factor.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use ndarray::Array2;
use rayon::prelude::*;

use crate::connections::ConnectionSet;
use crate::csf::{csf_from_sf, Cfg, CsfTree, SpinFunctionTable};
use crate::wavefunction::WaveFunction;

pub(crate) mod kernels;
use kernels::{
    climb_ds_l, climb_ds_r, climb_dv_l, climb_dv_r, climb_ss_l, climb_ss_r, climb_sv_l,
    climb_sv_r, seg_a, seg_f, walk_ds_l, walk_ds_r, walk_ss_l, walk_ss_r, walk_sv_l, walk_sv_r,
};

#[cfg(test)]
#[path = "coupling_tests.rs"]
mod coupling_tests;

// ==================
// Enum definitions
// ==================

/// The kind of a single spin-free excitation $`\hat{E}_{pq}`$, classified by the
/// occupations of the two orbitals it touches on the ket configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExcKind {
    /// Annihilation on a doubly-occupied orbital, creation on a singly-occupied one.
    DomoSomo,

    /// Annihilation on a doubly-occupied orbital, creation on an empty one.
    DomoVirtual,

    /// Annihilation and creation both on singly-occupied orbitals.
    SomoSomo,

    /// Annihilation on a singly-occupied orbital, creation on an empty one.
    SomoVirtual,
}

// ==================
// Struct definitions
// ==================

/// Canonical key of a one-operator coupling-coefficient block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CcKey1 {
    /// The excitation kind.
    pub kind: ExcKind,

    /// The number of unpaired electrons of the bra configuration.
    pub nue_left: usize,

    /// The number of unpaired electrons of the ket configuration.
    pub nue_right: usize,

    /// The number of singly-occupied orbitals below the creation orbital.
    pub prel: usize,

    /// The number of singly-occupied orbitals below the annihilation orbital.
    pub qrel: usize,
}

/// Canonical key of a two-operator coupling-coefficient block
/// $`\langle \mathrm{left} | \hat{E}_{pq} | \mathrm{RI} \rangle
/// \langle \mathrm{RI} | \hat{E}_{rs} | \mathrm{right} \rangle`$.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CcKey2 {
    /// The kind of the bra-side operator.
    pub kind_left: ExcKind,

    /// The kind of the ket-side operator.
    pub kind_right: ExcKind,

    /// The number of unpaired electrons of the bra configuration.
    pub nue_left: usize,

    /// The number of unpaired electrons of the intermediate configuration.
    pub nue_ri: usize,

    /// The number of unpaired electrons of the ket configuration.
    pub nue_right: usize,

    /// Relative creation position of the bra-side operator.
    pub prel_left: usize,

    /// Relative annihilation position of the bra-side operator.
    pub qrel_left: usize,

    /// Relative creation position of the ket-side operator.
    pub prel_right: usize,

    /// Relative annihilation position of the ket-side operator.
    pub qrel_right: usize,
}

/// A dense coupling-coefficient block keyed by global spin-function index pairs.
/// Spin-function pairs the Shavitt graphs do not connect are absent and read as
/// zero.
pub(crate) type CcBlock = HashMap<(usize, usize), f64>;

/// Classifies the excitation $`\hat{E}_{pq}`$ between `occ_left` and `occ_right`
/// and returns its canonical block key. The relative orbital positions are
/// counted on the ket configuration, except for the DOMO→virtual kind where the
/// bra configuration carries the singly-occupied orbitals of the prototype.
pub(crate) fn cc_info(
    p: usize,
    q: usize,
    nue_left: usize,
    nue_right: usize,
    occ_left: &[u8],
    occ_right: &[u8],
) -> CcKey1 {
    let kind = match (occ_right[p], occ_right[q]) {
        (1, 2) => ExcKind::DomoSomo,
        (0, 2) => ExcKind::DomoVirtual,
        (1, 1) => ExcKind::SomoSomo,
        (0, 1) => ExcKind::SomoVirtual,
        (dp, dq) => unreachable!("Incompatible occupations ({dp}, {dq}) for an excitation."),
    };
    let reference = if kind == ExcKind::DomoVirtual {
        occ_left
    } else {
        occ_right
    };
    let prel = reference[..p].iter().filter(|&&d| d == 1).count();
    let qrel = reference[..q].iter().filter(|&&d| d == 1).count();
    CcKey1 {
        kind,
        nue_left,
        nue_right,
        prel,
        qrel,
    }
}

// --------------
// PrototypeCfg
// --------------

/// An all-singly-occupied model configuration carrying only the CSF trie needed
/// by the walk and climb kernels.
#[derive(Clone, Debug)]
pub(crate) struct PrototypeCfg {
    occ: Vec<u8>,
    tree: CsfTree,
    n_csfs: usize,
}

impl PrototypeCfg {
    /// Creates a prototype without CSFs.
    fn new(occ: Vec<u8>) -> Self {
        Self {
            occ,
            tree: CsfTree::new(),
            n_csfs: 0,
        }
    }

    /// Creates a prototype and populates its trie from the given spin functions,
    /// in order.
    fn with_sfs(occ: Vec<u8>, sfs: &[String]) -> Self {
        let mut proto = Self::new(occ);
        proto.build_from_sfs(sfs);
        proto
    }

    /// Rebuilds the trie from the given spin functions, in order.
    fn build_from_sfs(&mut self, sfs: &[String]) {
        self.tree.reset();
        self.n_csfs = 0;
        for sf in sfs {
            let csf = csf_from_sf(&self.occ, sf);
            self.tree.insert(self.n_csfs, &csf);
            self.n_csfs += 1;
        }
    }

    fn tree(&self) -> &CsfTree {
        &self.tree
    }

    fn n_csfs(&self) -> usize {
        self.n_csfs
    }
}

// ==========================
// Prototype orbital placing
// ==========================

/// Prototype orbital pair of a DOMO→SOMO excitation.
fn ds_pq(prel: usize, qrel: usize) -> (usize, usize) {
    if prel >= qrel {
        (prel + 1, qrel)
    } else {
        (prel, qrel)
    }
}

/// Prototype orbital pair of a SOMO→virtual excitation.
fn sv_pq(prel: usize, qrel: usize) -> (usize, usize) {
    if prel > qrel {
        (prel, qrel)
    } else {
        (prel, qrel + 1)
    }
}

/// The prototype bra/ket configurations of a one-operator block.
fn prototypes_1el(key: &CcKey1, sfs_left: &[String], sfs_right: &[String]) -> (PrototypeCfg, PrototypeCfg) {
    match key.kind {
        ExcKind::DomoSomo => {
            let (p, q) = ds_pq(key.prel, key.qrel);
            let norb = key.nue_right + 1;
            let mut left = vec![1u8; norb];
            let mut right = vec![1u8; norb];
            left[p] = 2;
            right[q] = 2;
            (
                PrototypeCfg::with_sfs(left, sfs_left),
                PrototypeCfg::with_sfs(right, sfs_right),
            )
        }
        ExcKind::DomoVirtual => {
            let (p, q) = (key.prel, key.qrel);
            let norb = key.nue_left;
            let left = vec![1u8; norb];
            let mut right = vec![1u8; norb];
            right[p] = 0;
            right[q] = 2;
            (
                PrototypeCfg::with_sfs(left, sfs_left),
                PrototypeCfg::with_sfs(right, sfs_right),
            )
        }
        ExcKind::SomoSomo => {
            let (p, q) = (key.prel, key.qrel);
            let norb = key.nue_right;
            let mut left = vec![1u8; norb];
            let right = vec![1u8; norb];
            left[p] = 2;
            left[q] = 0;
            (
                PrototypeCfg::with_sfs(left, sfs_left),
                PrototypeCfg::with_sfs(right, sfs_right),
            )
        }
        ExcKind::SomoVirtual => {
            let (p, q) = sv_pq(key.prel, key.qrel);
            let norb = key.nue_right + 1;
            let mut left = vec![1u8; norb];
            let mut right = vec![1u8; norb];
            left[q] = 0;
            right[p] = 0;
            (
                PrototypeCfg::with_sfs(left, sfs_left),
                PrototypeCfg::with_sfs(right, sfs_right),
            )
        }
    }
}

// ====================
// Coefficient kernels
// ====================

/// The dense coefficient matrix of a single excitation of the given kind between
/// two prototypes, indexed by their local CSF positions.
fn calc_cc(
    kind: ExcKind,
    prel: usize,
    qrel: usize,
    left: &PrototypeCfg,
    right: &PrototypeCfg,
) -> Array2<f64> {
    match kind {
        ExcKind::DomoSomo => {
            let (p, q) = ds_pq(prel, qrel);
            let mut ccs = Array2::zeros((left.n_csfs(), right.n_csfs()));
            if p < q {
                walk_ds_r(p, q, false, 1.0, 0, left.tree(), 0, right.tree(), 0, &mut ccs);
            } else {
                walk_ds_l(p, q, false, 1.0, 0, left.tree(), 0, right.tree(), 0, &mut ccs);
            }
            ccs
        }
        ExcKind::DomoVirtual => {
            // A DOMO→virtual factor is a SOMO→SOMO walk with bra and ket roles
            // swapped, transposed back at the end.
            let (p, q) = (prel, qrel);
            let mut ccs = Array2::zeros((right.n_csfs(), left.n_csfs()));
            if q < p {
                walk_ss_r(q, p, false, 1.0, 0, right.tree(), 0, left.tree(), 0, &mut ccs);
            } else {
                walk_ss_l(q, p, false, 1.0, 0, right.tree(), 0, left.tree(), 0, &mut ccs);
            }
            ccs.reversed_axes()
        }
        ExcKind::SomoSomo => {
            let (p, q) = (prel, qrel);
            let mut ccs = Array2::zeros((left.n_csfs(), right.n_csfs()));
            if p < q {
                walk_ss_r(p, q, false, 1.0, 0, left.tree(), 0, right.tree(), 0, &mut ccs);
            } else {
                walk_ss_l(p, q, false, 1.0, 0, left.tree(), 0, right.tree(), 0, &mut ccs);
            }
            ccs
        }
        ExcKind::SomoVirtual => {
            let (p, q) = sv_pq(prel, qrel);
            let mut ccs = Array2::zeros((left.n_csfs(), right.n_csfs()));
            if p < q {
                walk_sv_r(p, q, false, 1.0, 0, left.tree(), 0, right.tree(), 0, &mut ccs);
            } else {
                walk_sv_l(p, q, false, 1.0, 0, left.tree(), 0, right.tree(), 0, &mut ccs);
            }
            ccs
        }
    }
}

/// Enumerates the spin functions of the intermediate configuration connected to
/// `proto` through a single excitation of the given kind at prototype orbitals
/// $`(p, q)`$.
fn find_connected_sfs(kind: ExcKind, p: usize, q: usize, proto: &PrototypeCfg) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut sf = String::new();
    match kind {
        ExcKind::DomoSomo => {
            if p < q {
                climb_ds_r(p, q, false, 0, 0, &mut sf, proto.tree(), 0, &mut out);
            } else {
                climb_ds_l(p, q, false, 0, 0, &mut sf, proto.tree(), 0, &mut out);
            }
        }
        ExcKind::DomoVirtual => {
            if p < q {
                climb_dv_r(p, q, false, 0, 0, &mut sf, proto.tree(), 0, &mut out);
            } else {
                climb_dv_l(p, q, false, 0, 0, &mut sf, proto.tree(), 0, &mut out);
            }
        }
        ExcKind::SomoSomo => {
            if p < q {
                climb_ss_r(p, q, false, 0, 0, &mut sf, proto.tree(), 0, &mut out);
            } else {
                climb_ss_l(p, q, false, 0, 0, &mut sf, proto.tree(), 0, &mut out);
            }
        }
        ExcKind::SomoVirtual => {
            if p < q {
                climb_sv_r(p, q, false, 0, 0, &mut sf, proto.tree(), 0, &mut out);
            } else {
                climb_sv_l(p, q, false, 0, 0, &mut sf, proto.tree(), 0, &mut out);
            }
        }
    }
    out
}

// ======================
// Per-key block compute
// ======================

fn sf_strings(table: &SpinFunctionTable, nue: usize, idxs: &[usize]) -> Vec<String> {
    idxs.iter()
        .map(|&idx| {
            table
                .sf(nue, idx)
                .unwrap_or_else(|| panic!("Spin function {idx} with {nue} unpaired electrons is not catalogued."))
                .to_string()
        })
        .collect()
}

fn scatter(m: &Array2<f64>, left_idxs: &[usize], right_idxs: &[usize]) -> CcBlock {
    let mut block = CcBlock::with_capacity(left_idxs.len() * right_idxs.len());
    for (i, &mu) in left_idxs.iter().enumerate() {
        for (j, &nu) in right_idxs.iter().enumerate() {
            block.insert((mu, nu), m[(i, j)]);
        }
    }
    block
}

fn compute_1el_block(
    table: &SpinFunctionTable,
    key: &CcKey1,
    left_idxs: &[usize],
    right_idxs: &[usize],
) -> CcBlock {
    let sfs_left = sf_strings(table, key.nue_left, left_idxs);
    let sfs_right = sf_strings(table, key.nue_right, right_idxs);
    let (left, right) = prototypes_1el(key, &sfs_left, &sfs_right);
    let m = calc_cc(key.kind, key.prel, key.qrel, &left, &right);
    scatter(&m, left_idxs, right_idxs)
}

fn compute_2el_block(
    table: &SpinFunctionTable,
    key: &CcKey2,
    left_idxs: &[usize],
    right_idxs: &[usize],
) -> CcBlock {
    let sfs_left = sf_strings(table, key.nue_left, left_idxs);
    let sfs_right = sf_strings(table, key.nue_right, right_idxs);

    // Ket-side factor <RI|E_rs|right>.
    let (right_proto, ri_right_occ, connected_right) = match key.kind_right {
        ExcKind::DomoSomo => {
            let (p, q) = ds_pq(key.prel_right, key.qrel_right);
            let norb = key.nue_right + 1;
            let mut middle = vec![1u8; norb];
            let mut right = vec![1u8; norb];
            middle[p] = 2;
            right[q] = 2;
            let proto = PrototypeCfg::with_sfs(right, &sfs_right);
            let connected = find_connected_sfs(ExcKind::DomoSomo, p, q, &proto);
            (proto, middle, connected)
        }
        ExcKind::DomoVirtual => {
            let (p, q) = (key.prel_right, key.qrel_right);
            let norb = key.nue_ri;
            let middle = vec![1u8; norb];
            let mut right = vec![1u8; norb];
            right[p] = 0;
            right[q] = 2;
            let proto = PrototypeCfg::with_sfs(right, &sfs_right);
            let connected = find_connected_sfs(ExcKind::DomoVirtual, q, p, &proto);
            (proto, middle, connected)
        }
        ExcKind::SomoSomo => {
            let (p, q) = (key.prel_right, key.qrel_right);
            let norb = key.nue_right;
            let mut middle = vec![1u8; norb];
            let right = vec![1u8; norb];
            middle[p] = 2;
            middle[q] = 0;
            let proto = PrototypeCfg::with_sfs(right, &sfs_right);
            let connected = find_connected_sfs(ExcKind::SomoSomo, p, q, &proto);
            (proto, middle, connected)
        }
        ExcKind::SomoVirtual => {
            let (p, q) = sv_pq(key.prel_right, key.qrel_right);
            let norb = key.nue_right + 1;
            let mut middle = vec![1u8; norb];
            let mut right = vec![1u8; norb];
            middle[q] = 0;
            right[p] = 0;
            let proto = PrototypeCfg::with_sfs(right, &sfs_right);
            let connected = find_connected_sfs(ExcKind::SomoVirtual, p, q, &proto);
            (proto, middle, connected)
        }
    };

    // Bra-side factor <left|E_pq|RI>.
    let (left_proto, ri_left_occ, connected_left) = match key.kind_left {
        ExcKind::DomoSomo => {
            let (p, q) = ds_pq(key.prel_left, key.qrel_left);
            let norb = key.nue_ri + 1;
            let mut left = vec![1u8; norb];
            let mut middle = vec![1u8; norb];
            left[p] = 2;
            middle[q] = 2;
            let proto = PrototypeCfg::with_sfs(left, &sfs_left);
            let connected = find_connected_sfs(ExcKind::DomoSomo, q, p, &proto);
            (proto, middle, connected)
        }
        ExcKind::DomoVirtual => {
            let (p, q) = (key.prel_left, key.qrel_left);
            let norb = key.nue_left;
            let left = vec![1u8; norb];
            let mut middle = vec![1u8; norb];
            middle[p] = 0;
            middle[q] = 2;
            let proto = PrototypeCfg::with_sfs(left, &sfs_left);
            let connected = find_connected_sfs(ExcKind::SomoSomo, q, p, &proto);
            (proto, middle, connected)
        }
        ExcKind::SomoSomo => {
            let (p, q) = (key.prel_left, key.qrel_left);
            let norb = key.nue_ri;
            let middle = vec![1u8; norb];
            let mut left = vec![1u8; norb];
            left[p] = 2;
            left[q] = 0;
            let proto = PrototypeCfg::with_sfs(left, &sfs_left);
            let connected = find_connected_sfs(ExcKind::DomoVirtual, p, q, &proto);
            (proto, middle, connected)
        }
        ExcKind::SomoVirtual => {
            let (p, q) = sv_pq(key.prel_left, key.qrel_left);
            let norb = key.nue_ri + 1;
            let mut left = vec![1u8; norb];
            let mut middle = vec![1u8; norb];
            left[q] = 0;
            middle[p] = 0;
            let proto = PrototypeCfg::with_sfs(left, &sfs_left);
            let connected = find_connected_sfs(ExcKind::SomoVirtual, q, p, &proto);
            (proto, middle, connected)
        }
    };

    let sfs_ri = connected_left
        .intersection(&connected_right)
        .cloned()
        .collect::<Vec<String>>();
    let ri_left = PrototypeCfg::with_sfs(ri_left_occ, &sfs_ri);
    let ri_right = PrototypeCfg::with_sfs(ri_right_occ, &sfs_ri);

    let cc1 = calc_cc(key.kind_left, key.prel_left, key.qrel_left, &left_proto, &ri_left);
    let cc2 = calc_cc(key.kind_right, key.prel_right, key.qrel_right, &ri_right, &right_proto);
    let m = cc1.dot(&cc2);
    scatter(&m, left_idxs, right_idxs)
}

fn compute_dia_block(
    table: &SpinFunctionTable,
    key: &CcKey1,
    right_idxs: &[usize],
) -> CcBlock {
    let sfs_right = sf_strings(table, key.nue_right, right_idxs);

    let (ri_proto, right_proto) = match key.kind {
        ExcKind::DomoSomo => {
            let (p, q) = ds_pq(key.prel, key.qrel);
            let norb = key.nue_right + 1;
            let mut left = vec![1u8; norb];
            let mut right = vec![1u8; norb];
            left[p] = 2;
            right[q] = 2;
            let right_proto = PrototypeCfg::with_sfs(right, &sfs_right);
            let sfs_ri = find_connected_sfs(ExcKind::DomoSomo, p, q, &right_proto)
                .into_iter()
                .collect::<Vec<_>>();
            (PrototypeCfg::with_sfs(left, &sfs_ri), right_proto)
        }
        ExcKind::DomoVirtual => {
            let (p, q) = (key.prel, key.qrel);
            let norb = key.nue_left;
            let left = vec![1u8; norb];
            let mut right = vec![1u8; norb];
            right[p] = 0;
            right[q] = 2;
            let right_proto = PrototypeCfg::with_sfs(right, &sfs_right);
            let sfs_ri = find_connected_sfs(ExcKind::DomoVirtual, q, p, &right_proto)
                .into_iter()
                .collect::<Vec<_>>();
            (PrototypeCfg::with_sfs(left, &sfs_ri), right_proto)
        }
        ExcKind::SomoSomo => {
            let (p, q) = (key.prel, key.qrel);
            let norb = key.nue_right;
            let mut left = vec![1u8; norb];
            let right = vec![1u8; norb];
            left[p] = 2;
            left[q] = 0;
            let right_proto = PrototypeCfg::with_sfs(right, &sfs_right);
            let sfs_ri = find_connected_sfs(ExcKind::SomoSomo, p, q, &right_proto)
                .into_iter()
                .collect::<Vec<_>>();
            (PrototypeCfg::with_sfs(left, &sfs_ri), right_proto)
        }
        ExcKind::SomoVirtual => {
            let (p, q) = sv_pq(key.prel, key.qrel);
            let norb = key.nue_right + 1;
            let mut left = vec![1u8; norb];
            let mut right = vec![1u8; norb];
            left[q] = 0;
            right[p] = 0;
            let right_proto = PrototypeCfg::with_sfs(right, &sfs_right);
            let sfs_ri = find_connected_sfs(ExcKind::SomoVirtual, p, q, &right_proto)
                .into_iter()
                .collect::<Vec<_>>();
            (PrototypeCfg::with_sfs(left, &sfs_ri), right_proto)
        }
    };

    let cc = calc_cc(key.kind, key.prel, key.qrel, &ri_proto, &right_proto);
    let m = cc.t().dot(&cc);
    scatter(&m, right_idxs, right_idxs)
}

// ===============
// CouplingCoeffs
// ===============

type SfCover = (BTreeSet<usize>, BTreeSet<usize>);

/// The per-iteration coupling-coefficient cache.
///
/// Blocks are computed lazily the first time a canonical key is needed and are
/// shared read-only by every consumer of the iteration. The cache remembers which
/// spin-function index pairs a block already covers, so appending configurations
/// within an iteration only computes the missing sub-blocks. It is invalidated
/// whenever the wavefunction is rebuilt.
#[derive(Clone, Debug, Default)]
pub struct CouplingCoeffs {
    ccs_1el: IndexMap<CcKey1, CcBlock>,
    ccs_2el: IndexMap<CcKey2, CcBlock>,
    ccs_dia: IndexMap<CcKey1, CcBlock>,
    covered_1el: IndexMap<CcKey1, SfCover>,
    covered_2el: IndexMap<CcKey2, SfCover>,
    covered_dia: IndexMap<CcKey1, SfCover>,
}

impl CouplingCoeffs {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards all cached blocks. Call whenever the wavefunction is rebuilt.
    pub fn invalidate(&mut self) {
        self.ccs_1el.clear();
        self.ccs_2el.clear();
        self.ccs_dia.clear();
        self.covered_1el.clear();
        self.covered_2el.clear();
        self.covered_dia.clear();
    }

    /// Ensures the cache covers every block the given connections consume, with
    /// `wfn_left` supplying the bra configurations and `wfn_right` the ket
    /// configurations. Missing sub-blocks are computed in parallel.
    pub fn construct(
        &mut self,
        table: &SpinFunctionTable,
        connections: &ConnectionSet,
        wfn_left: &WaveFunction,
        wfn_right: &WaveFunction,
    ) {
        // One-operator blocks.
        let mut tasks_1el = Vec::new();
        for (key, conns) in connections.one_el.iter() {
            let mut need: SfCover = Default::default();
            for conn in conns {
                need.0.extend(wfn_left.cfg(conn.icfg_left).sf_idxs().iter().copied());
                need.1.extend(wfn_right.cfg(conn.icfg_right).sf_idxs().iter().copied());
            }
            subtasks(self.covered_1el.entry(*key).or_default(), need)
                .into_iter()
                .for_each(|(l, r)| tasks_1el.push((*key, l, r)));
        }
        let blocks = tasks_1el
            .par_iter()
            .map(|(key, l, r)| (*key, compute_1el_block(table, key, l, r)))
            .collect::<Vec<_>>();
        for (key, block) in blocks {
            self.ccs_1el.entry(key).or_default().extend(block);
        }

        // Two-operator blocks.
        let mut tasks_2el = Vec::new();
        for (key, conns) in connections.two_el.iter() {
            let mut need: SfCover = Default::default();
            for conn in conns {
                need.0.extend(wfn_left.cfg(conn.icfg_left).sf_idxs().iter().copied());
                need.1.extend(wfn_right.cfg(conn.icfg_right).sf_idxs().iter().copied());
            }
            subtasks(self.covered_2el.entry(*key).or_default(), need)
                .into_iter()
                .for_each(|(l, r)| tasks_2el.push((*key, l, r)));
        }
        let blocks = tasks_2el
            .par_iter()
            .map(|(key, l, r)| (*key, compute_2el_block(table, key, l, r)))
            .collect::<Vec<_>>();
        for (key, block) in blocks {
            self.ccs_2el.entry(key).or_default().extend(block);
        }

        // Configuration-diagonal blocks. The block is a Gram product over one
        // spin-function set, so any extension recomputes the full set to cover
        // the cross pairs between new and old members.
        let mut tasks_dia = Vec::new();
        for (key, conns) in connections.diagonal.iter() {
            let mut need = BTreeSet::new();
            for conn in conns {
                need.extend(wfn_right.cfg(conn.icfg).sf_idxs().iter().copied());
            }
            let covered = self.covered_dia.entry(*key).or_default();
            if !need.is_subset(&covered.1) {
                covered.1.extend(need);
                tasks_dia.push((*key, covered.1.iter().copied().collect::<Vec<_>>()));
            }
        }
        let blocks = tasks_dia
            .par_iter()
            .map(|(key, r)| (*key, compute_dia_block(table, key, r)))
            .collect::<Vec<_>>();
        for (key, block) in blocks {
            self.ccs_dia.entry(key).or_default().extend(block);
        }
    }

    /// The one-operator block for `key`.
    pub(crate) fn one_el(&self, key: &CcKey1) -> &CcBlock {
        self.ccs_1el
            .get(key)
            .unwrap_or_else(|| panic!("Missing one-electron coupling block for {key:?}."))
    }

    /// The two-operator block for `key`.
    pub(crate) fn two_el(&self, key: &CcKey2) -> &CcBlock {
        self.ccs_2el
            .get(key)
            .unwrap_or_else(|| panic!("Missing two-electron coupling block for {key:?}."))
    }

    /// The configuration-diagonal block for `key`.
    pub(crate) fn diagonal(&self, key: &CcKey1) -> &CcBlock {
        self.ccs_dia
            .get(key)
            .unwrap_or_else(|| panic!("Missing diagonal coupling block for {key:?}."))
    }
}

/// Splits the needed spin-function pair cover into the sub-blocks not yet
/// covered and records them as covered.
fn subtasks(covered: &mut SfCover, need: SfCover) -> Vec<(Vec<usize>, Vec<usize>)> {
    let new_left = need.0.difference(&covered.0).copied().collect::<Vec<_>>();
    let new_right = need.1.difference(&covered.1).copied().collect::<Vec<_>>();
    let old_left = covered.0.iter().copied().collect::<Vec<_>>();
    let old_right = covered.1.iter().copied().collect::<Vec<_>>();

    let mut tasks = Vec::new();
    if !new_left.is_empty() && !new_right.is_empty() {
        tasks.push((new_left.clone(), new_right.clone()));
    }
    if !new_left.is_empty() && !old_right.is_empty() {
        tasks.push((new_left.clone(), old_right));
    }
    if !old_left.is_empty() && !new_right.is_empty() {
        tasks.push((old_left, new_right.clone()));
    }

    covered.0.extend(new_left);
    covered.1.extend(new_right);
    tasks
}

// ==========================
// Diagonal exchange factors
// ==========================

/// The per-CSF diagonal matrix elements of the exchange operator between the
/// singly-occupied orbitals $`p < q`$ of a configuration, from the closed-form
/// product of segment values along each step vector.
pub(crate) fn diagonal_exchange(p: usize, q: usize, cfg: &Cfg) -> Vec<f64> {
    let n_orbitals = cfg.occupation().len();
    let mut ccx = vec![0.0; cfg.n_csfs()];

    let mut b_vals = vec![0i32; n_orbitals];
    for (icsf, ccx_val) in ccx.iter_mut().enumerate() {
        let csf = cfg.csf(icsf);
        let mut b = 0;
        for (i, &d) in csf.iter().enumerate() {
            b += match d {
                1 => 1,
                2 => -1,
                _ => 0,
            };
            b_vals[i] = b;
        }

        let (dp, dq) = (csf[p], csf[q]);
        let head = match (dp, dq) {
            (1, 1) | (1, 2) => seg_a(b_vals[p], 2, 0),
            (2, 1) | (2, 2) => seg_a(b_vals[p], 0, 2),
            _ => continue,
        };
        let tail = match dq {
            1 => seg_a(b_vals[q], -1, 1),
            _ => seg_a(b_vals[q], 3, 1),
        };
        let sign = if dp == dq { 1.0 } else { -1.0 };

        let mut contrib = sign * head;
        for k in (p + 1)..q {
            contrib *= seg_f(csf[k], b_vals[k]);
        }
        *ccx_val = contrib * tail;
    }

    ccx
}
