//! The variational wavefunction: an ordered set of configurations with a
//! contiguous coefficient-block layout and a trie over their occupation-number
//! vectors.

use std::fmt;

use crate::csf::{Cfg, ABSENT};

#[cfg(test)]
#[path = "wavefunction_tests.rs"]
mod wavefunction_tests;

// ==================
// Struct definitions
// ==================

// --------
// CfgTree
// --------

/// A node of a [`CfgTree`].
#[derive(Clone, Debug)]
struct CfgNode {
    /// Child links per occupation digit; [`ABSENT`] where no configuration
    /// continues with that digit.
    children: [usize; 3],

    /// The index of the configuration terminating at this node, if any.
    pos: Option<usize>,
}

impl CfgNode {
    fn new() -> Self {
        Self {
            children: [ABSENT; 3],
            pos: None,
        }
    }
}

/// A trie over occupation-number digits mapping each stored configuration to its
/// index, with incremental descent for prefix-pruned scans.
#[derive(Clone, Debug)]
pub struct CfgTree {
    nodes: Vec<CfgNode>,
}

impl Default for CfgTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CfgTree {
    /// Creates an empty tree holding only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![CfgNode::new()],
        }
    }

    /// Inserts the digit path of `occ` and marks the terminal node with `pos`.
    pub fn insert(&mut self, pos: usize, occ: &[u8]) {
        let mut current = 0;
        for &d in occ {
            let slot = usize::from(d);
            let child = self.nodes[current].children[slot];
            current = if child == ABSENT {
                let idx = self.nodes.len();
                self.nodes.push(CfgNode::new());
                self.nodes[current].children[slot] = idx;
                idx
            } else {
                child
            };
        }
        self.nodes[current].pos = Some(pos);
    }

    /// The index of the configuration with occupation vector `occ`, or `None`.
    pub fn position_of(&self, occ: &[u8]) -> Option<usize> {
        let mut current = 0;
        for &d in occ {
            current = self.descend(current, d)?;
        }
        self.nodes[current].pos
    }

    /// The node reached after consuming `occ[..stop]` from the root, or `None`
    /// when no stored configuration shares that prefix.
    pub(crate) fn search_from_root(&self, stop: usize, occ: &[u8]) -> Option<usize> {
        let mut current = 0;
        for &d in &occ[..stop] {
            current = self.descend(current, d)?;
        }
        Some(current)
    }

    /// The child of `node` along occupation digit `d`, if present.
    pub(crate) fn descend(&self, node: usize, d: u8) -> Option<usize> {
        let child = self.nodes[node].children[usize::from(d)];
        (child != ABSENT).then_some(child)
    }

    /// Consumes `occ[start..]` from `node` and returns the terminal configuration
    /// index, or `None` when the path is absent.
    pub(crate) fn position_from(&self, node: usize, start: usize, occ: &[u8]) -> Option<usize> {
        let mut current = node;
        for &d in &occ[start..] {
            current = self.descend(current, d)?;
        }
        self.nodes[current].pos
    }
}

// -------------
// WaveFunction
// -------------

/// An ordered sequence of configurations, each annotated with its starting offset
/// into the flat CSF-coefficient array and its block length.
///
/// Offsets are strictly increasing and contiguous; the total dimension equals the
/// sum of the per-configuration CSF counts. A wavefunction is rebuilt by a single
/// thread between Davidson runs and is read-only during one run.
#[derive(Clone, Debug)]
pub struct WaveFunction {
    /// The total spin $`S`$ of the wavefunction.
    spin: f64,

    /// The configurations in insertion order.
    cfgs: Vec<Cfg>,

    /// Per configuration, the starting offset of its coefficient block.
    offsets: Vec<usize>,

    /// The total number of CSFs across all configurations.
    n_csfs: usize,

    /// The trie over the stored occupation-number vectors.
    tree: CfgTree,
}

impl WaveFunction {
    /// Creates an empty wavefunction of total spin `spin`.
    pub fn new(spin: f64) -> Self {
        Self {
            spin,
            cfgs: Vec::new(),
            offsets: Vec::new(),
            n_csfs: 0,
            tree: CfgTree::new(),
        }
    }

    /// The total spin $`S`$.
    pub fn spin(&self) -> f64 {
        self.spin
    }

    /// Appends a configuration, assigning it the next contiguous coefficient-block
    /// offset, and returns its index.
    pub fn insert_cfg(&mut self, cfg: Cfg) -> usize {
        debug_assert!(
            self.tree.position_of(cfg.occupation()).is_none(),
            "Configuration `{cfg}` is already part of the wavefunction."
        );
        let icfg = self.cfgs.len();
        self.tree.insert(icfg, cfg.occupation());
        self.offsets.push(self.n_csfs);
        self.n_csfs += cfg.n_csfs();
        self.cfgs.push(cfg);
        icfg
    }

    /// The number of configurations.
    pub fn n_cfgs(&self) -> usize {
        self.cfgs.len()
    }

    /// The total number of CSFs.
    pub fn n_csfs(&self) -> usize {
        self.n_csfs
    }

    /// The configuration at index `icfg`.
    pub fn cfg(&self, icfg: usize) -> &Cfg {
        &self.cfgs[icfg]
    }

    /// The coefficient-block offset of configuration `icfg`.
    pub fn offset(&self, icfg: usize) -> usize {
        self.offsets[icfg]
    }

    /// The coefficient-block length of configuration `icfg`.
    pub fn block_len(&self, icfg: usize) -> usize {
        self.cfgs[icfg].n_csfs()
    }

    /// The index of the configuration with occupation vector `occ`, or `None`.
    pub fn find_cfg(&self, occ: &[u8]) -> Option<usize> {
        self.tree.position_of(occ)
    }

    /// The trie over the stored occupation-number vectors.
    pub(crate) fn tree(&self) -> &CfgTree {
        &self.tree
    }

    /// Iterates over the configurations in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Cfg> {
        self.cfgs.iter()
    }
}

impl fmt::Display for WaveFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Wavefunction: {} CFGs, {} CSFs", self.n_cfgs(), self.n_csfs())
    }
}
